//! Run async work from a synchronous worker thread.
//!
//! Every call builds its own current-thread tokio runtime, drives the future
//! under a deadline, and shuts the runtime down before returning. Runtimes
//! are never shared between workers or reused between calls, so a hung or
//! panicking call cannot poison anything beyond itself.
//!
//! Must not be called from inside an async context; worker threads in
//! [`crate::executor`] are plain OS threads.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::context::{ExecutionContext, Outcome};
use crate::errors::BridgeError;

/// Drive `fut` to completion on a fresh runtime, giving up after `limit`.
///
/// The runtime is torn down on return, on timeout, and while unwinding from
/// a panic inside `fut`.
pub fn block_on_with_timeout<F>(limit: Duration, fut: F) -> Result<F::Output, BridgeError>
where
    F: Future,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(BridgeError::Runtime)?;

    let started = Instant::now();
    let result = runtime.block_on(tokio::time::timeout(limit, fut));
    // Don't wait on stragglers (e.g. a child process reader) left behind by a timeout.
    runtime.shutdown_background();

    result.map_err(|_| BridgeError::TimedOut {
        elapsed: started.elapsed(),
        limit,
    })
}

/// Like [`block_on_with_timeout`], but for futures that already produce an
/// [`Outcome`]. Bridge failures become `Failed` outcomes tagged with the
/// target and elapsed time.
pub fn run_action<F>(ctx: &ExecutionContext, action: &str, limit: Duration, fut: F) -> Outcome
where
    F: Future<Output = Outcome>,
{
    match block_on_with_timeout(limit, fut) {
        Ok(outcome) => outcome,
        Err(BridgeError::TimedOut { elapsed, limit }) => {
            warn!(repo = %ctx.target.full_name, action, ?elapsed, "action timed out");
            Outcome::failed(format!(
                "{} timed out after {:.1}s on {}",
                action,
                elapsed.as_secs_f64(),
                ctx.target.full_name
            ))
            .with_action(action)
            .with_meta("target", ctx.target.full_name.clone())
            .with_meta("elapsed_secs", elapsed.as_secs_f64())
            .with_meta("timeout_secs", limit.as_secs())
        }
        Err(e) => Outcome::failed(e.to_string())
            .with_action(action)
            .with_meta("target", ctx.target.full_name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunFlags;
    use crate::target::Target;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            Target::new("widgets", "/fleet/widgets").with_owner("acme"),
            "/fleet",
            RunFlags::default(),
        )
    }

    #[test]
    fn test_completes_within_limit() {
        let value = block_on_with_timeout(Duration::from_secs(5), async { 41 + 1 }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_inner_errors_pass_through() {
        let result: Result<Result<(), String>, _> =
            block_on_with_timeout(Duration::from_secs(5), async { Err("nope".to_string()) });
        assert_eq!(result.unwrap(), Err("nope".to_string()));
    }

    #[test]
    fn test_timeout_reports_elapsed() {
        let err = block_on_with_timeout(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .unwrap_err();
        match err {
            BridgeError::TimedOut { elapsed, limit } => {
                assert_eq!(limit, Duration::from_millis(20));
                assert!(elapsed >= limit);
                assert!(elapsed < Duration::from_secs(5));
            }
            other => panic!("Expected TimedOut, got {other:?}"),
        }
    }

    #[test]
    fn test_usable_again_after_panic() {
        let caught = std::panic::catch_unwind(|| {
            let _: Result<(), BridgeError> =
                block_on_with_timeout(Duration::from_secs(5), async { panic!("boom") });
        });
        assert!(caught.is_err());

        let value = block_on_with_timeout(Duration::from_secs(5), async { "ok" }).unwrap();
        assert_eq!(value, "ok");
    }

    #[test]
    fn test_independent_runtimes_per_thread() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    block_on_with_timeout(Duration::from_secs(5), async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        i * 2
                    })
                    .unwrap()
                })
            })
            .collect();
        let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_run_action_converts_timeout_to_failed_outcome() {
        let ctx = ctx();
        let outcome = run_action(&ctx, "git-fetch", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Outcome::success("never")
        });
        assert!(outcome.is_failed());
        assert!(outcome.message().contains("acme/widgets"));
        assert_eq!(outcome.action(), Some("git-fetch"));
        assert_eq!(outcome.metadata()["target"], "acme/widgets");
        assert!(outcome.metadata()["elapsed_secs"].as_f64().unwrap() >= 0.01);
    }

    #[test]
    fn test_run_action_passes_outcome_through() {
        let ctx = ctx();
        let outcome = run_action(&ctx, "noop", Duration::from_secs(5), async {
            Outcome::success("fine")
        });
        assert!(outcome.is_success());
        assert_eq!(outcome.message(), "fine");
    }
}
