//! Git actions, run through the `git` executable so credentials, hooks and
//! SSH configuration behave exactly as they do for the operator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use super::process::{ToolOutput, capture, spawn_failure};
use super::{Action, ellipsize};
use crate::bridge;
use crate::context::{ExecutionContext, Outcome};

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(120);

/// Variable read by [`GitCommit`].
pub const COMMIT_MESSAGE_VAR: &str = "commit_message";

/// Run `git <args>` in `cwd` and map the result onto an outcome.
fn run_git(
    ctx: &ExecutionContext,
    action: &str,
    cwd: &Path,
    args: Vec<String>,
    limit: Duration,
    on_exit: impl FnOnce(&ToolOutput) -> Outcome,
) -> Outcome {
    bridge::run_action(ctx, action, limit, async move {
        match capture("git", &args, cwd).await {
            Ok(out) => out.annotate(on_exit(&out).with_action(action)),
            Err(e) => spawn_failure(action, &e, None),
        }
    })
}

fn git_args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Clone the target into its path.
pub struct GitClone {
    timeout: Duration,
}

impl GitClone {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_CLONE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GitClone {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for GitClone {
    fn name(&self) -> &str {
        "clone"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx);
        }
        let Some(url) = ctx.target.clone_url.clone() else {
            return Outcome::failed("No clone URL for repository").with_action(self.name());
        };
        info!(repo = %ctx.target.full_name, "cloning");

        // The parent must exist; the target directory must not.
        let cwd: PathBuf = ctx
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.base_dir.clone());
        let dest = ctx.path().to_string_lossy().to_string();

        run_git(
            ctx,
            self.name(),
            &cwd,
            vec!["clone".to_string(), url.clone(), dest],
            self.timeout,
            |out| {
                if out.succeeded() {
                    Outcome::success("Cloned successfully")
                } else {
                    Outcome::failed("Failed to clone")
                }
            },
        )
        .with_meta("clone_url", url)
    }

    fn preview_message(&self, ctx: &ExecutionContext) -> String {
        format!("Would clone {}", ctx.target.name)
    }
}

/// `git pull origin <default branch>`.
pub struct GitPull {
    timeout: Duration,
}

impl GitPull {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_PULL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GitPull {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for GitPull {
    fn name(&self) -> &str {
        "pull"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx);
        }
        info!(repo = %ctx.target.full_name, "pulling");
        let branch = ctx.target.default_branch.clone();
        let cwd = ctx.path().to_path_buf();
        run_git(
            ctx,
            self.name(),
            &cwd,
            vec!["pull".to_string(), "origin".to_string(), branch],
            self.timeout,
            |out| {
                if out.succeeded() {
                    Outcome::success("Pulled latest changes")
                } else {
                    Outcome::failed(format!("Failed to pull changes: {}", out.stderr.trim()))
                }
            },
        )
    }

    fn preview_message(&self, ctx: &ExecutionContext) -> String {
        format!("Would pull {}", ctx.target.name)
    }
}

/// `git fetch`. Updates remote-tracking refs only.
pub struct GitFetch {
    timeout: Duration,
}

impl GitFetch {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GitFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for GitFetch {
    fn name(&self) -> &str {
        "fetch"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx);
        }
        let cwd = ctx.path().to_path_buf();
        run_git(ctx, self.name(), &cwd, git_args(["fetch"]), self.timeout, |out| {
            if out.succeeded() {
                Outcome::success("Fetched from remote")
            } else {
                Outcome::failed(format!("Failed to fetch: {}", out.stderr.trim()))
            }
        })
    }

    fn preview_message(&self, ctx: &ExecutionContext) -> String {
        format!("Would fetch {}", ctx.target.name)
    }
}

/// `git add <files>`.
pub struct GitAdd {
    files: String,
}

impl GitAdd {
    pub fn new(files: impl Into<String>) -> Self {
        Self {
            files: files.into(),
        }
    }
}

impl Default for GitAdd {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Action for GitAdd {
    fn name(&self) -> &str {
        "git-add"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx).with_meta("files", self.files.clone());
        }
        let cwd = ctx.path().to_path_buf();
        let files = self.files.clone();
        run_git(
            ctx,
            self.name(),
            &cwd,
            vec!["add".to_string(), files.clone()],
            DEFAULT_GIT_TIMEOUT,
            |out| {
                if out.succeeded() {
                    Outcome::success(format!("Staged files: {}", files))
                } else {
                    Outcome::failed(format!("Failed to stage files: {}", out.stderr.trim()))
                }
            },
        )
        .with_meta("files", self.files.clone())
    }

    fn preview_message(&self, _ctx: &ExecutionContext) -> String {
        format!("Would stage files: {}", self.files)
    }
}

/// Commit staged changes with the message in the `commit_message`
/// variable, defaulting to `Update`.
pub struct GitCommit;

impl GitCommit {
    fn message(ctx: &ExecutionContext) -> String {
        ctx.var_str(COMMIT_MESSAGE_VAR)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("Update")
            .to_string()
    }
}

impl Action for GitCommit {
    fn name(&self) -> &str {
        "git-commit"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        let message = Self::message(ctx);
        if ctx.preview_only() {
            return self.preview(ctx).with_meta("message", message);
        }
        let cwd = ctx.path().to_path_buf();
        run_git(
            ctx,
            self.name(),
            &cwd,
            vec!["commit".to_string(), "-m".to_string(), message.clone()],
            DEFAULT_GIT_TIMEOUT,
            |out| {
                if out.succeeded() {
                    Outcome::success("Committed changes")
                } else {
                    Outcome::failed(format!("Commit failed: {}", out.stderr.trim()))
                }
            },
        )
        .with_meta("message", message)
    }

    fn preview_message(&self, ctx: &ExecutionContext) -> String {
        format!(
            "Would commit with message: {}",
            ellipsize(&Self::message(ctx), 50)
        )
    }
}

/// `git push`.
pub struct GitPush {
    timeout: Duration,
}

impl GitPush {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GitPush {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for GitPush {
    fn name(&self) -> &str {
        "git-push"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx);
        }
        let cwd = ctx.path().to_path_buf();
        run_git(ctx, self.name(), &cwd, git_args(["push"]), self.timeout, |out| {
            if out.succeeded() {
                Outcome::success("Pushed to remote")
            } else {
                Outcome::failed(format!("Push failed: {}", out.stderr.trim()))
            }
        })
    }

    fn preview_message(&self, ctx: &ExecutionContext) -> String {
        format!("Would push {} to remote", ctx.target.name)
    }
}
