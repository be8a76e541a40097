//! Diagnostic tracing for gitfleet.
//!
//! Tracing output goes to stderr and is controlled by `RUST_LOG`. The batch
//! plan, per-target result lines and summaries are user output and are
//! printed by `ui`, independently of the filter set here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `warn`, or `debug` for
/// the `gitfleet` crate when `verbose` is on.
///
/// ```bash
/// RUST_LOG=gitfleet=trace gitfleet run status
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,gitfleet=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}
