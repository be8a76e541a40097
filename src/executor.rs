//! Runs a pipeline across a fleet of targets.
//!
//! One batch goes through four stages:
//! 1. **Plan**: one context per target; unless guards are ignored the
//!    pipeline's global guards split the fleet into "run" and "skip" before
//!    anything executes.
//! 2. **Confirm**: unless auto-confirmed or previewing, ask on the
//!    controlling terminal. No answer means no.
//! 3. **Dispatch**: a bounded pool of worker threads pulls contexts from a
//!    shared queue. Sequential mode, or a pipeline that is not safe to run in
//!    parallel, gets exactly one worker.
//! 4. **Collect**: results arrive over a channel in completion order and are
//!    handed to the [`BatchObserver`] as they land.
//!
//! A panic inside one target's run is caught at the worker and becomes that
//! target's `Failed` outcome. Setting the cancel flag stops workers from
//! taking new targets; what is already running finishes.

use std::collections::VecDeque;
#[cfg(unix)]
use std::fs::OpenOptions;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use console::Term;
use dialoguer::Confirm;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::context::{ExecutionContext, Outcome, OutcomeStatus, RunFlags};
use crate::exit_codes;
use crate::pipeline::Pipeline;
use crate::target::Target;

/// Run-wide settings for one batch.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    pub flags: RunFlags,
    /// Pool size. `None` uses the pipeline's preference, then the CPU count.
    pub max_workers: Option<usize>,
    pub sequential: bool,
    /// Seeded into every context's variable bag.
    pub variables: Map<String, Value>,
}

impl ExecutorOptions {
    pub fn preview_only(mut self, on: bool) -> Self {
        self.flags.preview_only = on;
        self
    }

    pub fn ignore_guards(mut self, on: bool) -> Self {
        self.flags.ignore_guards = on;
        self
    }

    pub fn auto_confirm(mut self, on: bool) -> Self {
        self.flags.auto_confirm = on;
        self
    }

    pub fn with_max_workers(mut self, workers: Option<usize>) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn sequential(mut self, on: bool) -> Self {
        self.sequential = on;
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// A target left out of dispatch, and why.
#[derive(Debug, Clone)]
pub struct SkippedTarget {
    pub target: Target,
    pub reason: String,
}

/// The run/skip partition, computed once before dispatch.
#[derive(Debug, Default)]
pub struct BatchPlan {
    pub to_run: Vec<ExecutionContext>,
    pub skipped: Vec<SkippedTarget>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.to_run.is_empty()
    }
}

/// Final outcome of one target's pipeline run.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub target: Target,
    pub outcome: Outcome,
    /// Every action outcome recorded during the run.
    pub steps: Vec<Outcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every planned target was dispatched (possibly none).
    Completed,
    /// The operator declined, or no terminal was available to ask.
    Declined,
    /// Interrupted before every planned target was dispatched.
    Cancelled,
}

/// What a batch produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub pipeline: String,
    pub status: BatchStatus,
    /// One entry per dispatched target, in completion order.
    pub outcomes: Vec<TargetOutcome>,
    pub skipped: Vec<SkippedTarget>,
}

/// Success, skipped and failed counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Tally {
    pub fn add(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Success => self.success += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|r| r.outcome.is_failed())
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for r in &self.outcomes {
            tally.add(r.outcome.status());
        }
        tally
    }

    /// Process exit code for this batch.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            BatchStatus::Cancelled => exit_codes::CANCELLED,
            _ if self.has_failures() => exit_codes::FAILED,
            _ => exit_codes::OK,
        }
    }
}

/// Asks the operator whether to go ahead.
pub trait Confirmation {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Prompts on the controlling terminal, whatever stdin and stderr point at.
/// Anything but an explicit yes declines, and so does having no terminal.
pub struct TtyConfirm;

impl Confirmation for TtyConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let Some(term) = controlling_terminal() else {
            return false;
        };
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact_on(&term)
            .unwrap_or(false)
    }
}

#[cfg(unix)]
fn controlling_terminal() -> Option<Term> {
    let tty = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/tty")
        .ok()?;
    let writer = tty.try_clone().ok()?;
    Some(Term::read_write_pair(tty, writer))
}

#[cfg(not(unix))]
fn controlling_terminal() -> Option<Term> {
    let term = Term::stderr();
    term.is_term().then_some(term)
}

/// Always answers the same way.
pub struct FixedAnswer(pub bool);

impl Confirmation for FixedAnswer {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Receives batch events. Every call happens on the thread that called
/// [`Executor::execute`].
pub trait BatchObserver {
    fn plan(&mut self, _pipeline: &Pipeline, _plan: &BatchPlan, _flags: RunFlags) {}

    fn declined(&mut self) {}

    fn started(&mut self, _pipeline: &Pipeline, _total: usize, _workers: usize) {}

    fn completed(&mut self, _result: &TargetOutcome) {}

    fn finished(&mut self, _report: &BatchReport) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl BatchObserver for Silent {}

pub struct Executor {
    base_dir: PathBuf,
    options: ExecutorOptions,
    confirmation: Box<dyn Confirmation>,
    cancel: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(base_dir: impl Into<PathBuf>, options: ExecutorOptions) -> Self {
        Self {
            base_dir: base_dir.into(),
            options,
            confirmation: Box::new(TtyConfirm),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_confirmation(mut self, confirmation: impl Confirmation + 'static) -> Self {
        self.confirmation = Box::new(confirmation);
        self
    }

    /// Share a cancel flag, e.g. one set by a Ctrl-C handler.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build contexts and split the fleet by the pipeline's global guards.
    pub fn plan(&self, pipeline: &Pipeline, targets: Vec<Target>) -> BatchPlan {
        let mut plan = BatchPlan::default();
        for target in targets {
            let mut ctx = ExecutionContext::new(target, self.base_dir.clone(), self.options.flags);
            for (key, value) in &self.options.variables {
                ctx.set_var(key.clone(), value.clone());
            }
            if !self.options.flags.ignore_guards
                && let Some(reason) = pipeline.should_skip(&ctx)
            {
                plan.skipped.push(SkippedTarget {
                    target: ctx.target,
                    reason,
                });
                continue;
            }
            plan.to_run.push(ctx);
        }
        plan
    }

    /// Number of workers a batch of `pending` targets would get.
    pub fn worker_count(&self, pipeline: &Pipeline, pending: usize) -> usize {
        let hints = pipeline.hints();
        if self.options.sequential || !hints.safe_parallel {
            return 1;
        }
        let wanted = self
            .options
            .max_workers
            .or(hints.default_workers)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));
        wanted.clamp(1, pending.max(1))
    }

    /// Plan, confirm, dispatch and collect one batch.
    pub fn execute(
        &self,
        pipeline: &Pipeline,
        targets: Vec<Target>,
        observer: &mut dyn BatchObserver,
    ) -> BatchReport {
        let plan = self.plan(pipeline, targets);
        observer.plan(pipeline, &plan, self.options.flags);

        let BatchPlan { to_run, skipped } = plan;
        let mut report = BatchReport {
            pipeline: pipeline.name().to_string(),
            status: BatchStatus::Completed,
            outcomes: Vec::with_capacity(to_run.len()),
            skipped,
        };
        if to_run.is_empty() {
            return report;
        }

        let flags = self.options.flags;
        if !flags.auto_confirm && !flags.preview_only && !self.confirmation.confirm("Proceed?") {
            report.status = BatchStatus::Declined;
            observer.declined();
            return report;
        }

        let workers = self.worker_count(pipeline, to_run.len());
        info!(
            pipeline = pipeline.name(),
            targets = to_run.len(),
            workers,
            "dispatching batch"
        );
        observer.started(pipeline, to_run.len(), workers);

        report.outcomes = self.dispatch(pipeline, to_run, workers, observer);
        // The flag is sticky: an interrupt after the last target was claimed
        // still cancels the batch.
        if self.cancel.load(Ordering::SeqCst) {
            report.status = BatchStatus::Cancelled;
        }

        observer.finished(&report);
        pipeline.finish_batch();
        report
    }

    fn dispatch(
        &self,
        pipeline: &Pipeline,
        contexts: Vec<ExecutionContext>,
        workers: usize,
        observer: &mut dyn BatchObserver,
    ) -> Vec<TargetOutcome> {
        let queue = Mutex::new(VecDeque::from(contexts));
        let (tx, rx) = mpsc::channel::<TargetOutcome>();
        let mut results = Vec::new();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let cancel = &self.cancel;
                scope.spawn(move || {
                    loop {
                        if cancel.load(Ordering::SeqCst) {
                            break;
                        }
                        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                        let Some(ctx) = next else {
                            break;
                        };
                        if tx.send(run_isolated(pipeline, ctx)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for result in rx {
                observer.completed(&result);
                results.push(result);
            }
        });

        results
    }
}

/// Run one target's pipeline, turning a panic into a `Failed` outcome.
fn run_isolated(pipeline: &Pipeline, mut ctx: ExecutionContext) -> TargetOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&mut ctx)));
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(repo = %ctx.target.full_name, error = %message, "pipeline panicked");
            Outcome::failed(format!("Unexpected error: {}", message))
                .with_action(pipeline.name())
                .with_meta("target", ctx.target.full_name.clone())
        }
    };
    let steps = ctx.outcomes().to_vec();
    TargetOutcome {
        target: ctx.target,
        outcome,
        steps,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, action};
    use crate::predicate::{Predicate, Verdict, guard};
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Succeeds, fails or panics depending on the target name.
    struct ByName {
        runs: Arc<AtomicUsize>,
    }

    impl Action for ByName {
        fn name(&self) -> &str {
            "by-name"
        }

        fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match ctx.target.name.as_str() {
                "explodes" => panic!("kaboom in {}", ctx.target.name),
                "fails" => Outcome::failed("nope"),
                _ => Outcome::success("ok"),
            }
        }
    }

    /// Passes unless the target name starts with `skip-`.
    struct NotSkipPrefixed;

    impl Predicate for NotSkipPrefixed {
        fn check(&self, ctx: &ExecutionContext) -> Verdict {
            if ctx.target.name.starts_with("skip-") {
                Verdict::fail("name says skip")
            } else {
                Verdict::pass("fine")
            }
        }
    }

    fn targets(names: &[&str]) -> Vec<Target> {
        names
            .iter()
            .map(|n| Target::new(*n, format!("/fleet/{}", n)))
            .collect()
    }

    fn pipeline(runs: &Arc<AtomicUsize>) -> Pipeline {
        Pipeline::new("test", "")
            .when(guard(NotSkipPrefixed))
            .then(action(ByName {
                runs: Arc::clone(runs),
            }))
    }

    fn auto() -> ExecutorOptions {
        ExecutorOptions::default().auto_confirm(true)
    }

    // =========================================
    // Planning
    // =========================================

    mod planning {
        use super::*;

        #[test]
        fn test_guard_failures_land_in_skip_partition() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", auto());
            let plan = executor.plan(&pipeline(&runs), targets(&["a", "skip-b", "c"]));
            assert_eq!(plan.to_run.len(), 2);
            assert_eq!(plan.skipped.len(), 1);
            assert_eq!(plan.skipped[0].target.name, "skip-b");
            assert_eq!(plan.skipped[0].reason, "name says skip");
        }

        #[test]
        fn test_skipped_targets_are_never_dispatched() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", auto());
            let report = executor.execute(&pipeline(&runs), targets(&["a", "skip-b"]), &mut Silent);
            assert_eq!(runs.load(Ordering::SeqCst), 1);
            assert_eq!(report.outcomes.len(), 1);
            assert_eq!(report.outcomes[0].target.name, "a");
            assert_eq!(report.skipped.len(), 1);
        }

        #[test]
        fn test_ignore_guards_dispatches_everything() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", auto().ignore_guards(true));
            let report = executor.execute(&pipeline(&runs), targets(&["a", "skip-b"]), &mut Silent);
            assert_eq!(runs.load(Ordering::SeqCst), 2);
            assert!(report.skipped.is_empty());
        }

        #[test]
        fn test_variables_are_seeded() {
            let executor = Executor::new("/fleet", auto().with_variable("commit_message", "Bump deps"));
            let p = Pipeline::new("p", "");
            let plan = executor.plan(&p, targets(&["a"]));
            assert_eq!(plan.to_run[0].var_str("commit_message"), Some("Bump deps"));
        }

        #[test]
        fn test_empty_plan_returns_nothing() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", ExecutorOptions::default())
                .with_confirmation(FixedAnswer(false));
            let report = executor.execute(&pipeline(&runs), targets(&["skip-a"]), &mut Silent);
            assert_eq!(report.status, BatchStatus::Completed);
            assert!(report.outcomes.is_empty());
            assert_eq!(report.exit_code(), exit_codes::OK);
        }
    }

    // =========================================
    // Confirmation
    // =========================================

    mod confirmation {
        use super::*;

        #[cfg(unix)]
        #[test]
        fn test_prompt_uses_dev_tty() {
            let reachable = OpenOptions::new()
                .read(true)
                .write(true)
                .open("/dev/tty")
                .is_ok();
            assert_eq!(controlling_terminal().is_some(), reachable);
        }

        #[test]
        fn test_declined_runs_nothing() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", ExecutorOptions::default())
                .with_confirmation(FixedAnswer(false));
            let report = executor.execute(&pipeline(&runs), targets(&["a", "b"]), &mut Silent);
            assert_eq!(report.status, BatchStatus::Declined);
            assert!(report.outcomes.is_empty());
            assert_eq!(runs.load(Ordering::SeqCst), 0);
            assert_eq!(report.exit_code(), exit_codes::OK);
        }

        #[test]
        fn test_preview_needs_no_confirmation() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", ExecutorOptions::default().preview_only(true))
                .with_confirmation(FixedAnswer(false));
            let report = executor.execute(&pipeline(&runs), targets(&["a", "b"]), &mut Silent);
            assert_eq!(report.status, BatchStatus::Completed);
            assert_eq!(report.outcomes.len(), 2);
            assert_eq!(runs.load(Ordering::SeqCst), 0);
            assert!(report.outcomes.iter().all(|r| r.outcome.is_success()));
        }

        #[test]
        fn test_accepted_runs() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", ExecutorOptions::default())
                .with_confirmation(FixedAnswer(true));
            let report = executor.execute(&pipeline(&runs), targets(&["a"]), &mut Silent);
            assert_eq!(report.outcomes.len(), 1);
        }
    }

    // =========================================
    // Failure isolation
    // =========================================

    mod isolation {
        use super::*;

        #[test]
        fn test_panic_is_contained_with_one_worker() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", auto().with_max_workers(Some(1)));
            let report = executor.execute(
                &pipeline(&runs),
                targets(&["a", "b", "explodes", "c", "d"]),
                &mut Silent,
            );

            assert_eq!(report.outcomes.len(), 5);
            let failed: Vec<_> = report
                .outcomes
                .iter()
                .filter(|r| r.outcome.is_failed())
                .collect();
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].target.name, "explodes");
            assert!(failed[0].outcome.message().starts_with("Unexpected error: kaboom"));
            assert_eq!(failed[0].outcome.metadata()["target"], "explodes");
            assert_eq!(report.exit_code(), exit_codes::FAILED);
        }

        #[test]
        fn test_parallel_collects_every_target() {
            let runs = Arc::new(AtomicUsize::new(0));
            let names: Vec<String> = (0..20).map(|i| format!("r{}", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let executor = Executor::new("/fleet", auto().with_max_workers(Some(4)));
            let report = executor.execute(&pipeline(&runs), targets(&refs), &mut Silent);

            assert_eq!(report.outcomes.len(), 20);
            let seen: HashSet<_> = report.outcomes.iter().map(|r| r.target.name.clone()).collect();
            assert_eq!(seen.len(), 20);
            assert!(!report.has_failures());
        }

        #[test]
        fn test_reported_failure_sets_exit_code() {
            let runs = Arc::new(AtomicUsize::new(0));
            let executor = Executor::new("/fleet", auto());
            let report = executor.execute(&pipeline(&runs), targets(&["a", "fails"]), &mut Silent);
            assert!(report.has_failures());
            assert_eq!(report.tally(), Tally { success: 1, skipped: 0, failed: 1 });
            assert_eq!(report.exit_code(), exit_codes::FAILED);
        }
    }

    // =========================================
    // Scheduling
    // =========================================

    mod scheduling {
        use super::*;

        #[test]
        fn test_worker_count() {
            let p = Pipeline::new("p", "");
            let e = Executor::new("/fleet", auto().with_max_workers(Some(8)));
            assert_eq!(e.worker_count(&p, 3), 3);
            assert_eq!(e.worker_count(&p, 100), 8);

            let seq = Executor::new("/fleet", auto().with_max_workers(Some(8)).sequential(true));
            assert_eq!(seq.worker_count(&p, 100), 1);

            let unsafe_parallel = Pipeline::new("p", "").sequential_only();
            assert_eq!(e.worker_count(&unsafe_parallel, 100), 1);

            let preferred = Pipeline::new("p", "").default_workers(2);
            let default = Executor::new("/fleet", auto());
            assert_eq!(default.worker_count(&preferred, 100), 2);
        }

        /// Records the peak number of concurrently running targets.
        struct Overlap {
            active: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        impl Action for Overlap {
            fn name(&self) -> &str {
                "overlap"
            }

            fn execute(&self, _ctx: &mut ExecutionContext) -> Outcome {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                self.active.fetch_sub(1, Ordering::SeqCst);
                Outcome::success("ok")
            }
        }

        #[test]
        fn test_sequential_only_pipeline_never_overlaps() {
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let p = Pipeline::new("p", "").sequential_only().then(action(Overlap {
                active: Arc::clone(&active),
                peak: Arc::clone(&peak),
            }));
            let executor = Executor::new("/fleet", auto().with_max_workers(Some(4)));
            executor.execute(&p, targets(&["a", "b", "c", "d"]), &mut Silent);
            assert_eq!(peak.load(Ordering::SeqCst), 1);
        }
    }

    // =========================================
    // Cancellation
    // =========================================

    mod cancellation {
        use super::*;

        /// Sets the cancel flag the first time it runs.
        struct Interrupt(Arc<AtomicBool>);

        impl Action for Interrupt {
            fn name(&self) -> &str {
                "interrupt"
            }

            fn execute(&self, _ctx: &mut ExecutionContext) -> Outcome {
                self.0.store(true, Ordering::SeqCst);
                Outcome::success("ran")
            }
        }

        #[test]
        fn test_cancel_stops_new_dispatch() {
            let cancel = Arc::new(AtomicBool::new(false));
            let p = Pipeline::new("p", "").then(action(Interrupt(Arc::clone(&cancel))));
            let executor = Executor::new("/fleet", auto().sequential(true))
                .with_cancel_flag(Arc::clone(&cancel));
            let report = executor.execute(&p, targets(&["a", "b", "c"]), &mut Silent);

            assert_eq!(report.outcomes.len(), 1);
            assert_eq!(report.status, BatchStatus::Cancelled);
            assert_eq!(report.exit_code(), exit_codes::CANCELLED);
        }

        /// Waits until every worker holds a target, then interrupts.
        struct InterruptWhenAllRunning {
            barrier: Arc<Barrier>,
            cancel: Arc<AtomicBool>,
        }

        impl Action for InterruptWhenAllRunning {
            fn name(&self) -> &str {
                "interrupt-when-all-running"
            }

            fn execute(&self, _ctx: &mut ExecutionContext) -> Outcome {
                self.barrier.wait();
                self.cancel.store(true, Ordering::SeqCst);
                Outcome::success("ran")
            }
        }

        #[test]
        fn test_cancel_after_last_target_claimed() {
            let cancel = Arc::new(AtomicBool::new(false));
            let p = Pipeline::new("p", "").then(action(InterruptWhenAllRunning {
                barrier: Arc::new(Barrier::new(2)),
                cancel: Arc::clone(&cancel),
            }));
            let executor = Executor::new("/fleet", auto().with_max_workers(Some(2)))
                .with_cancel_flag(Arc::clone(&cancel));
            let report = executor.execute(&p, targets(&["a", "b"]), &mut Silent);

            assert_eq!(report.outcomes.len(), 2);
            assert!(report.outcomes.iter().all(|o| o.outcome.is_success()));
            assert_eq!(report.status, BatchStatus::Cancelled);
            assert_eq!(report.exit_code(), exit_codes::CANCELLED);
        }

        #[test]
        fn test_cancel_before_dispatch() {
            let runs = Arc::new(AtomicUsize::new(0));
            let cancel = Arc::new(AtomicBool::new(true));
            let executor = Executor::new("/fleet", auto()).with_cancel_flag(cancel);
            let report = executor.execute(&pipeline(&runs), targets(&["a", "b"]), &mut Silent);
            assert_eq!(runs.load(Ordering::SeqCst), 0);
            assert_eq!(report.status, BatchStatus::Cancelled);
        }
    }

    // =========================================
    // Observer
    // =========================================

    #[derive(Default)]
    struct Recorder {
        planned: usize,
        skipped: usize,
        started: Option<(usize, usize)>,
        completed: Vec<String>,
        finished: bool,
    }

    impl BatchObserver for Recorder {
        fn plan(&mut self, _pipeline: &Pipeline, plan: &BatchPlan, _flags: RunFlags) {
            self.planned = plan.to_run.len();
            self.skipped = plan.skipped.len();
        }

        fn started(&mut self, _pipeline: &Pipeline, total: usize, workers: usize) {
            self.started = Some((total, workers));
        }

        fn completed(&mut self, result: &TargetOutcome) {
            self.completed.push(result.target.name.clone());
        }

        fn finished(&mut self, _report: &BatchReport) {
            self.finished = true;
        }
    }

    #[test]
    fn test_observer_sees_every_stage() {
        let runs = Arc::new(AtomicUsize::new(0));
        let executor = Executor::new("/fleet", auto().with_max_workers(Some(2)));
        let mut recorder = Recorder::default();
        executor.execute(&pipeline(&runs), targets(&["a", "b", "skip-c"]), &mut recorder);

        assert_eq!(recorder.planned, 2);
        assert_eq!(recorder.skipped, 1);
        assert_eq!(recorder.started, Some((2, 2)));
        assert_eq!(recorder.completed.len(), 2);
        assert!(recorder.finished);
    }

    #[test]
    fn test_batch_hook_runs_once_after_dispatch() {
        let runs = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hook_calls);
        let p = pipeline(&runs).on_batch_complete(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        Executor::new("/fleet", auto()).execute(&p, targets(&["a", "b"]), &mut Silent);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);

        let declined = Executor::new("/fleet", ExecutorOptions::default())
            .with_confirmation(FixedAnswer(false));
        declined.execute(&p, targets(&["a"]), &mut Silent);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }
}
