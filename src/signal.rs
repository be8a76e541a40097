//! Ctrl-C handling for a batch.
//!
//! The first interrupt sets the shared cancel flag so workers stop taking
//! new targets while in-flight ones finish. A second interrupt exits
//! immediately with [`exit_codes::CANCELLED`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use console::style;
use tracing::{debug, warn};

use crate::exit_codes;

/// Start the watcher thread and return the flag it sets.
pub fn install() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("Failed to build signal runtime")?;

    let flag = Arc::clone(&cancel);
    std::thread::Builder::new()
        .name("gitfleet-signal".into())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "cannot listen for Ctrl-C");
                        return;
                    }
                    if flag.swap(true, Ordering::SeqCst) {
                        std::process::exit(exit_codes::CANCELLED);
                    }
                    debug!("interrupt received");
                    eprintln!(
                        "\n{}",
                        style("Interrupted: finishing in-flight repositories (Ctrl-C again to abort)")
                            .yellow()
                    );
                }
            });
        })
        .context("Failed to spawn signal thread")?;

    Ok(cancel)
}
