//! Units of work a pipeline applies to a target.
//!
//! | Module        | Actions                                                             |
//! |---------------|---------------------------------------------------------------------|
//! | `git`         | `GitClone`, `GitPull`, `GitFetch`, `GitAdd`, `GitCommit`, `GitPush` |
//! | `files`       | `JsonPatch`, `JsonRead`                                             |
//! | `process`     | `Subprocess`, `ClaudeCli`, `ConditionalSkill`, `GhCli`              |
//! | `description` | `DescriptionSync`                                                   |
//!
//! The status probe lives next to its classifier in [`crate::status`].

pub mod description;
pub mod files;
pub mod git;
pub mod process;

use std::sync::Arc;

use crate::context::{ExecutionContext, Outcome};

pub use description::DescriptionSync;
pub use files::{JsonPatch, JsonRead};
pub use git::{GitAdd, GitClone, GitCommit, GitFetch, GitPull, GitPush};
pub use process::{ClaudeCli, ConditionalSkill, GhCli, Subprocess};

/// A single step of work against one target.
///
/// Implementations must:
/// - return a `Success` describing the no-op when `ctx.preview_only()` is
///   set, without touching anything;
/// - turn every internal failure (missing tool, non-zero exit, timeout)
///   into a `Failed` outcome rather than panicking;
/// - be callable from any worker thread.
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome;

    /// What `execute` would do. Must not have side effects.
    fn preview_message(&self, ctx: &ExecutionContext) -> String {
        let _ = ctx;
        format!("Would execute {}", self.name())
    }

    /// The `Success` outcome reported instead of executing in preview mode.
    fn preview(&self, ctx: &ExecutionContext) -> Outcome {
        Outcome::success(self.preview_message(ctx))
            .with_action(self.name())
            .with_meta("dry_run", true)
    }
}

/// Shared, immutable action handle.
pub type ActionRef = Arc<dyn Action>;

/// Wrap a concrete action as an [`ActionRef`].
pub fn action<A: Action + 'static>(action: A) -> ActionRef {
    Arc::new(action)
}

/// Cut `text` to `max` characters, appending `...` when anything was cut.
pub(crate) fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", crate::context::truncate_chars(text, max))
    } else {
        text.to_string()
    }
}
