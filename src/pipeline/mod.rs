//! Pipelines: global guards, independent branches and sequential steps
//! composed into one unit that runs against a single target.
//!
//! ```ignore
//! let sync = Pipeline::new("sync", "Clone missing repositories, pull clean ones")
//!     .branch(not(guard(RepoExists)), action(GitClone::new()), None)
//!     .branch(all_of([guard(RepoExists), guard(RepoClean)]), action(GitPull::new()), None);
//! ```
//!
//! Branches are evaluated independently of each other: every branch whose
//! guard passes fires. Pipelines whose branch guards overlap get a warning
//! at run time.

pub mod registry;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::action::ActionRef;
use crate::context::{ExecutionContext, Outcome};
use crate::predicate::{AllOf, Guard, Predicate};

pub use registry::{PipelineOptions, PipelineSpec, build_pipeline, find_pipeline, registered};

/// One sequential instruction.
#[derive(Clone)]
pub struct Step {
    pub action: ActionRef,
    pub guard: Option<Guard>,
    pub stop_on_failure: bool,
}

/// One independently evaluated conditional instruction.
#[derive(Clone)]
pub struct Branch {
    pub guard: Guard,
    pub then: ActionRef,
    pub otherwise: Option<ActionRef>,
}

/// How the executor should schedule a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionHints {
    /// Needs an authenticated GitHub client.
    pub requires_token: bool,
    /// May run across targets concurrently. `false` forces one worker.
    pub safe_parallel: bool,
    /// Report through the progress bar instead of one line per target.
    pub progress_only: bool,
    /// Preferred worker count when the caller gives none.
    pub default_workers: Option<usize>,
}

impl Default for ExecutionHints {
    fn default() -> Self {
        Self {
            requires_token: false,
            safe_parallel: true,
            progress_only: false,
            default_workers: None,
        }
    }
}

/// Called once after a batch has been dispatched to completion.
pub type BatchHook = Arc<dyn Fn() + Send + Sync>;

/// A named recipe applied to each target. Built once, then shared read-only
/// by every worker.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    description: String,
    hints: ExecutionHints,
    guards: Vec<Guard>,
    branches: Vec<Branch>,
    steps: Vec<Step>,
    on_batch_complete: Option<BatchHook>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            hints: ExecutionHints::default(),
            guards: Vec::new(),
            branches: Vec::new(),
            steps: Vec::new(),
            on_batch_complete: None,
        }
    }

    pub fn requires_token(mut self) -> Self {
        self.hints.requires_token = true;
        self
    }

    /// Mark the pipeline unsafe to run across targets concurrently.
    pub fn sequential_only(mut self) -> Self {
        self.hints.safe_parallel = false;
        self
    }

    pub fn progress_only(mut self) -> Self {
        self.hints.progress_only = true;
        self
    }

    pub fn default_workers(mut self, workers: usize) -> Self {
        self.hints.default_workers = Some(workers.max(1));
        self
    }

    /// Add a global guard. All global guards must pass for the pipeline to
    /// run on a target.
    pub fn when(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Add an unconditional step that stops the pipeline if it fails.
    pub fn then(self, action: ActionRef) -> Self {
        self.then_with(action, true)
    }

    /// Add an unconditional step whose failure does not stop the pipeline.
    pub fn then_continue(self, action: ActionRef) -> Self {
        self.then_with(action, false)
    }

    pub fn then_with(mut self, action: ActionRef, stop_on_failure: bool) -> Self {
        self.steps.push(Step {
            action,
            guard: None,
            stop_on_failure,
        });
        self
    }

    /// Add a step that only runs when `guard` passes. A failing guard records
    /// a `Skipped` outcome for the step and moves on.
    pub fn then_if(mut self, guard: Guard, action: ActionRef, stop_on_failure: bool) -> Self {
        self.steps.push(Step {
            action,
            guard: Some(guard),
            stop_on_failure,
        });
        self
    }

    pub fn branch(mut self, when: Guard, then: ActionRef, otherwise: Option<ActionRef>) -> Self {
        self.branches.push(Branch {
            guard: when,
            then,
            otherwise,
        });
        self
    }

    /// Run `hook` after the executor has finished a batch of this pipeline.
    pub fn on_batch_complete(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_batch_complete = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn hints(&self) -> ExecutionHints {
        self.hints
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Invoke the post-batch hook, if any.
    pub fn finish_batch(&self) {
        if let Some(hook) = &self.on_batch_complete {
            hook();
        }
    }

    /// Evaluate the global guards as one conjunction. Returns the first
    /// failing reason, or `None` when the target should run.
    pub fn should_skip(&self, ctx: &ExecutionContext) -> Option<String> {
        if self.guards.is_empty() {
            return None;
        }
        let verdict = AllOf::new(self.guards.iter().cloned()).check(ctx);
        (!verdict.passed).then_some(verdict.reason)
    }

    /// Run the pipeline against one target, recording every action outcome
    /// in `ctx`. Returns the outcome that represents the whole run.
    ///
    /// In preview mode actions are asked for their preview and never
    /// executed. Global guards are re-checked unless guards are ignored.
    #[instrument(skip_all, fields(pipeline = %self.name, repo = %ctx.target.full_name))]
    pub fn run(&self, ctx: &mut ExecutionContext) -> Outcome {
        if !ctx.ignore_guards()
            && let Some(reason) = self.should_skip(ctx)
        {
            debug!(%reason, "guards not met");
            return Outcome::skipped(reason).with_action(self.name.as_str());
        }

        let mut fired = 0usize;
        for branch in &self.branches {
            let verdict = branch.guard.check(ctx);
            let chosen = if verdict.passed {
                fired += 1;
                Some(&branch.then)
            } else {
                branch.otherwise.as_ref()
            };
            let Some(action) = chosen else {
                continue;
            };
            let outcome = invoke(action, ctx);
            ctx.record(outcome.clone());
            if outcome.is_failed() {
                return outcome;
            }
        }
        if fired > 1 {
            warn!(
                fired,
                "multiple branches fired for one target; branch guards are not mutually exclusive"
            );
        }

        for step in &self.steps {
            if let Some(guard) = &step.guard {
                let verdict = guard.check(ctx);
                if !verdict.passed {
                    ctx.record(Outcome::skipped(verdict.reason).with_action(step.action.name()));
                    continue;
                }
            }
            let outcome = invoke(&step.action, ctx);
            ctx.record(outcome.clone());
            if outcome.is_failed() && step.stop_on_failure {
                return outcome;
            }
        }

        match ctx.last_outcome() {
            Some(last) => last.clone(),
            None => Outcome::success("Pipeline completed (no actions)").with_action(self.name.as_str()),
        }
    }

    /// Multi-line summary: name, description, then guard/branch/step counts.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("Pipeline: {}", self.name)];
        if !self.description.is_empty() {
            parts.push(format!("  {}", self.description));
        }
        if !self.guards.is_empty() {
            parts.push(format!("  Conditions: {} predicate(s)", self.guards.len()));
        }
        if !self.branches.is_empty() {
            parts.push(format!("  Branches: {}", self.branches.len()));
        }
        if !self.steps.is_empty() {
            parts.push(format!("  Steps: {}", self.steps.len()));
        }
        parts.join("\n")
    }
}

fn invoke(action: &ActionRef, ctx: &mut ExecutionContext) -> Outcome {
    if ctx.preview_only() {
        action.preview(ctx)
    } else {
        action.execute(ctx)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("hints", &self.hints)
            .field("guards", &self.guards.len())
            .field("branches", &self.branches.len())
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, action};
    use crate::context::RunFlags;
    use crate::predicate::{AlwaysFalse, AlwaysTrue, guard};
    use crate::target::Target;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts executions and returns a fixed outcome.
    struct Scripted {
        name: &'static str,
        fail: bool,
        runs: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn ok(name: &'static str) -> (ActionRef, Arc<AtomicUsize>) {
            Self::make(name, false)
        }

        fn failing(name: &'static str) -> (ActionRef, Arc<AtomicUsize>) {
            Self::make(name, true)
        }

        fn make(name: &'static str, fail: bool) -> (ActionRef, Arc<AtomicUsize>) {
            let runs = Arc::new(AtomicUsize::new(0));
            let a = action(Scripted {
                name,
                fail,
                runs: Arc::clone(&runs),
            });
            (a, runs)
        }
    }

    impl Action for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn execute(&self, _ctx: &mut ExecutionContext) -> Outcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Outcome::failed(format!("{} broke", self.name)).with_action(self.name)
            } else {
                Outcome::success(format!("{} done", self.name)).with_action(self.name)
            }
        }
    }

    fn ctx_with(flags: RunFlags) -> ExecutionContext {
        ExecutionContext::new(Target::new("widgets", "/nonexistent/widgets"), "/nonexistent", flags)
    }

    fn ctx() -> ExecutionContext {
        ctx_with(RunFlags::default())
    }

    fn yes() -> Guard {
        guard(AlwaysTrue)
    }

    fn no(reason: &str) -> Guard {
        guard(AlwaysFalse::new(reason))
    }

    // =========================================
    // Guards
    // =========================================

    mod guards {
        use super::*;

        #[test]
        fn test_no_guards_never_skips() {
            let p = Pipeline::new("p", "");
            assert_eq!(p.should_skip(&ctx()), None);
        }

        #[test]
        fn test_first_failing_guard_is_the_reason() {
            let p = Pipeline::new("p", "").when(yes()).when(no("first")).when(no("second"));
            assert_eq!(p.should_skip(&ctx()).as_deref(), Some("first"));
        }

        #[test]
        fn test_run_rechecks_guards() {
            let (a, runs) = Scripted::ok("a");
            let p = Pipeline::new("p", "").when(no("nope")).then(a);
            let mut c = ctx();
            let outcome = p.run(&mut c);
            assert!(outcome.is_skipped());
            assert_eq!(outcome.message(), "nope");
            assert_eq!(outcome.action(), Some("p"));
            assert_eq!(runs.load(Ordering::SeqCst), 0);
            assert!(c.outcomes().is_empty());
        }

        #[test]
        fn test_ignored_guards_run_anyway() {
            let (a, runs) = Scripted::ok("a");
            let p = Pipeline::new("p", "").when(no("nope")).then(a);
            let mut c = ctx_with(RunFlags {
                ignore_guards: true,
                ..RunFlags::default()
            });
            assert!(p.run(&mut c).is_success());
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        }
    }

    // =========================================
    // Branches
    // =========================================

    mod branches {
        use super::*;

        #[test]
        fn test_all_passing_branches_fire() {
            let (a, a_runs) = Scripted::ok("a");
            let (b, b_runs) = Scripted::ok("b");
            let p = Pipeline::new("p", "").branch(yes(), a, None).branch(yes(), b, None);
            let mut c = ctx();
            let outcome = p.run(&mut c);

            assert_eq!(a_runs.load(Ordering::SeqCst), 1);
            assert_eq!(b_runs.load(Ordering::SeqCst), 1);
            assert_eq!(c.outcomes().len(), 2);
            assert_eq!(outcome.message(), "b done");
        }

        #[test]
        fn test_else_runs_when_guard_fails() {
            let (a, a_runs) = Scripted::ok("a");
            let (b, b_runs) = Scripted::ok("b");
            let p = Pipeline::new("p", "").branch(no("x"), a, Some(b));
            let mut c = ctx();
            p.run(&mut c);
            assert_eq!(a_runs.load(Ordering::SeqCst), 0);
            assert_eq!(b_runs.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_failing_guard_without_else_records_nothing() {
            let (a, _) = Scripted::ok("a");
            let p = Pipeline::new("p", "").branch(no("x"), a, None);
            let mut c = ctx();
            let outcome = p.run(&mut c);
            assert!(c.outcomes().is_empty());
            assert_eq!(outcome.message(), "Pipeline completed (no actions)");
        }

        #[test]
        fn test_branch_failure_aborts_before_steps() {
            let (bad, _) = Scripted::failing("bad");
            let (later, later_runs) = Scripted::ok("later");
            let (step, step_runs) = Scripted::ok("step");
            let p = Pipeline::new("p", "")
                .branch(yes(), bad, None)
                .branch(yes(), later, None)
                .then(step);
            let mut c = ctx();
            let outcome = p.run(&mut c);

            assert!(outcome.is_failed());
            assert_eq!(outcome.message(), "bad broke");
            assert_eq!(later_runs.load(Ordering::SeqCst), 0);
            assert_eq!(step_runs.load(Ordering::SeqCst), 0);
            assert_eq!(c.outcomes().len(), 1);
        }
    }

    // =========================================
    // Steps
    // =========================================

    mod steps {
        use super::*;

        #[test]
        fn test_stop_on_failure_halts_remaining_steps() {
            let (first, _) = Scripted::ok("first");
            let (second, _) = Scripted::failing("second");
            let (third, third_runs) = Scripted::ok("third");
            let p = Pipeline::new("p", "").then(first).then(second).then(third);
            let mut c = ctx();
            let outcome = p.run(&mut c);

            assert!(outcome.is_failed());
            assert_eq!(c.outcomes().len(), 2);
            assert!(c.outcomes()[0].is_success());
            assert!(c.outcomes()[1].is_failed());
            assert_eq!(third_runs.load(Ordering::SeqCst), 0);
        }

        #[test]
        fn test_continue_past_failure() {
            let (bad, _) = Scripted::failing("bad");
            let (next, next_runs) = Scripted::ok("next");
            let p = Pipeline::new("p", "").then_continue(bad).then(next);
            let mut c = ctx();
            let outcome = p.run(&mut c);

            assert_eq!(next_runs.load(Ordering::SeqCst), 1);
            assert!(outcome.is_success());
            assert_eq!(c.outcomes().len(), 2);
        }

        #[test]
        fn test_guarded_step_skip_is_not_fatal() {
            let (skipped, skipped_runs) = Scripted::ok("maybe");
            let (after, after_runs) = Scripted::ok("after");
            let p = Pipeline::new("p", "")
                .then_if(no("not today"), skipped, true)
                .then(after);
            let mut c = ctx();
            p.run(&mut c);

            assert_eq!(skipped_runs.load(Ordering::SeqCst), 0);
            assert_eq!(after_runs.load(Ordering::SeqCst), 1);
            assert!(c.outcomes()[0].is_skipped());
            assert_eq!(c.outcomes()[0].message(), "not today");
            assert_eq!(c.outcomes()[0].action(), Some("maybe"));
        }

        #[test]
        fn test_empty_pipeline_succeeds() {
            let outcome = Pipeline::new("noop", "").run(&mut ctx());
            assert!(outcome.is_success());
            assert_eq!(outcome.message(), "Pipeline completed (no actions)");
        }
    }

    // =========================================
    // Preview
    // =========================================

    mod preview {
        use super::*;

        #[test]
        fn test_preview_never_executes() {
            let (a, a_runs) = Scripted::ok("a");
            let (b, b_runs) = Scripted::failing("b");
            let (c_action, c_runs) = Scripted::ok("c");
            let p = Pipeline::new("p", "")
                .branch(yes(), a, None)
                .then(b)
                .then(c_action);
            let mut c = ctx_with(RunFlags {
                preview_only: true,
                ..RunFlags::default()
            });
            let outcome = p.run(&mut c);

            assert_eq!(a_runs.load(Ordering::SeqCst), 0);
            assert_eq!(b_runs.load(Ordering::SeqCst), 0);
            assert_eq!(c_runs.load(Ordering::SeqCst), 0);
            assert_eq!(c.outcomes().len(), 3);
            assert!(c.outcomes().iter().all(Outcome::is_success));
            assert_eq!(outcome.message(), "Would execute c");
        }
    }

    #[test]
    fn test_describe_counts_parts() {
        let (a, _) = Scripted::ok("a");
        let (b, _) = Scripted::ok("b");
        let p = Pipeline::new("sync", "Keep things in sync")
            .when(yes())
            .branch(yes(), a, None)
            .then(b);
        let text = p.describe();
        assert!(text.contains("Pipeline: sync"));
        assert!(text.contains("Conditions: 1 predicate(s)"));
        assert!(text.contains("Branches: 1"));
        assert!(text.contains("Steps: 1"));
    }

    #[test]
    fn test_batch_hook_runs_on_finish() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let p = Pipeline::new("p", "").on_batch_complete(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        p.finish_batch();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hints_builders() {
        let p = Pipeline::new("p", "")
            .requires_token()
            .sequential_only()
            .progress_only()
            .default_workers(0);
        let hints = p.hints();
        assert!(hints.requires_token);
        assert!(!hints.safe_parallel);
        assert!(hints.progress_only);
        assert_eq!(hints.default_workers, Some(1));
    }
}
