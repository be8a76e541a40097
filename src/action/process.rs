//! Actions that shell out to external tools.
//!
//! Every tool runs with the target checkout as its working directory, on a
//! throwaway runtime from [`crate::bridge`], and is killed if it outlives
//! its timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Action, ellipsize};
use crate::bridge;
use crate::context::{ExecutionContext, Outcome};
use crate::errors::ToolError;

pub const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CLAUDE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_GH_TIMEOUT: Duration = Duration::from_secs(60);

const CLAUDE_NOT_FOUND: &str = "Claude CLI not found - ensure 'claude' is installed";
const GH_NOT_FOUND: &str = "gh CLI not found - ensure GitHub CLI is installed";

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }

    /// Attach exit code and both streams to `outcome`.
    pub fn annotate(&self, outcome: Outcome) -> Outcome {
        outcome
            .with_meta("returncode", self.code.unwrap_or(-1))
            .with_output("stdout", &self.stdout)
            .with_output("stderr", &self.stderr)
    }
}

/// Spawn `program` in `cwd`, wait for it and capture its output.
///
/// The child is killed if this future is dropped, which is what happens
/// when the surrounding bridge call times out.
pub async fn capture(program: &str, args: &[String], cwd: &Path) -> Result<ToolOutput, ToolError> {
    debug!(program, ?args, cwd = %cwd.display(), "spawning tool");
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound {
                    program: program.to_string(),
                }
            } else {
                ToolError::Spawn {
                    program: program.to_string(),
                    source,
                }
            }
        })?;

    Ok(ToolOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Outcome for a tool that never produced output.
pub(crate) fn spawn_failure(action: &str, err: &ToolError, not_found: Option<&str>) -> Outcome {
    let message = match (err, not_found) {
        (ToolError::NotFound { .. }, Some(msg)) => msg.to_string(),
        _ => err.to_string(),
    };
    Outcome::failed(message).with_action(action)
}

/// Run an arbitrary command in the checkout. Non-zero exit is a failure.
pub struct Subprocess {
    command: Vec<String>,
    timeout: Duration,
}

impl Subprocess {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_SUBPROCESS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Action for Subprocess {
    fn name(&self) -> &str {
        "subprocess"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx);
        }
        let Some((program, args)) = self.command.split_first() else {
            return Outcome::failed("Empty command").with_action(self.name());
        };
        let label = self
            .command
            .iter()
            .take(2)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        let cwd = ctx.path().to_path_buf();
        let name = self.name();

        bridge::run_action(ctx, name, self.timeout, async {
            match capture(program, args, &cwd).await {
                Ok(out) if out.succeeded() => out.annotate(
                    Outcome::success(format!("Command succeeded: {}...", label)).with_action(name),
                ),
                Ok(out) => out.annotate(
                    Outcome::failed(format!(
                        "Command failed with exit code {}",
                        out.code.unwrap_or(-1)
                    ))
                    .with_action(name),
                ),
                Err(e) => spawn_failure(name, &e, None),
            }
        })
        .with_meta("command", self.command.join(" "))
    }

    fn preview_message(&self, _ctx: &ExecutionContext) -> String {
        format!("Would run: {}", self.command.join(" "))
    }
}

/// Run the Claude CLI non-interactively with a prompt.
pub struct ClaudeCli {
    prompt: String,
    program: String,
    timeout: Duration,
}

impl ClaudeCli {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            program: "claude".to_string(),
            timeout: DEFAULT_CLAUDE_TIMEOUT,
        }
    }

    /// Use a different executable (e.g. from `CLAUDE_CMD`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub(crate) fn claude_args(prompt: &str) -> Vec<String> {
    vec![
        "-p".to_string(),
        prompt.to_string(),
        "--permission-mode".to_string(),
        "acceptEdits".to_string(),
        "--output-format".to_string(),
        "json".to_string(),
    ]
}

/// Lift `result` and cost out of Claude's JSON envelope, if it is one.
fn annotate_claude(out: &ToolOutput, outcome: Outcome) -> Outcome {
    let outcome = out.annotate(outcome);
    let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(out.stdout.trim()) else {
        return outcome;
    };
    let mut outcome = outcome;
    if let Some(result) = envelope.get("result").and_then(Value::as_str) {
        outcome = outcome.with_output("result", result);
    }
    if let Some(cost) = envelope.get("total_cost_usd").and_then(Value::as_f64) {
        outcome = outcome.with_meta("cost_usd", cost);
    }
    outcome
}

impl Action for ClaudeCli {
    fn name(&self) -> &str {
        "claude-cli"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self
                .preview(ctx)
                .with_meta("prompt_preview", ellipsize(&self.prompt, 100));
        }
        info!(repo = %ctx.target.full_name, "running Claude CLI");
        let args = claude_args(&self.prompt);
        let cwd = ctx.path().to_path_buf();
        let name = self.name();

        bridge::run_action(ctx, name, self.timeout, async {
            match capture(&self.program, &args, &cwd).await {
                Ok(out) if out.succeeded() => {
                    annotate_claude(&out, Outcome::success("Claude CLI completed").with_action(name))
                }
                Ok(out) => annotate_claude(
                    &out,
                    Outcome::failed(format!(
                        "Claude CLI failed with exit code {}",
                        out.code.unwrap_or(-1)
                    ))
                    .with_action(name),
                ),
                Err(e) => spawn_failure(name, &e, Some(CLAUDE_NOT_FOUND)),
            }
        })
    }

    fn preview_message(&self, _ctx: &ExecutionContext) -> String {
        format!(
            "Would run Claude CLI with prompt: {}",
            ellipsize(&self.prompt, 50)
        )
    }
}

/// Invoke a Claude skill, optionally letting Claude decide whether it
/// applies.
///
/// With a condition, Claude is asked to reply with the skip marker when the
/// condition is false; a reply containing the marker becomes `Skipped`.
pub struct ConditionalSkill {
    skill: String,
    skill_args: String,
    condition: Option<String>,
    skip_marker: String,
    program: String,
    timeout: Duration,
}

impl ConditionalSkill {
    pub fn new(skill: impl Into<String>) -> Self {
        Self {
            skill: skill.into(),
            skill_args: String::new(),
            condition: None,
            skip_marker: "Condition not met - skipped".to_string(),
            program: "claude".to_string(),
            timeout: DEFAULT_CLAUDE_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.skill_args = args.into();
        self
    }

    pub fn with_condition(mut self, condition: Option<String>) -> Self {
        self.condition = condition.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_skip_marker(mut self, marker: impl Into<String>) -> Self {
        self.skip_marker = marker.into();
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn invocation(&self) -> String {
        if self.skill_args.is_empty() {
            format!("/{}", self.skill)
        } else {
            format!("/{} {}", self.skill, self.skill_args)
        }
    }

    pub fn prompt(&self) -> String {
        match &self.condition {
            Some(condition) => format!(
                "First, evaluate this condition: {}\n\n\
                 If the condition is TRUE: Run {}\n\
                 If the condition is FALSE: Respond ONLY with: {}",
                condition,
                self.invocation(),
                self.skip_marker
            ),
            None => self.invocation(),
        }
    }
}

impl Action for ConditionalSkill {
    fn name(&self) -> &str {
        "conditional-skill"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        let prompt = self.prompt();
        if ctx.preview_only() {
            return self
                .preview(ctx)
                .with_meta("skill", self.skill.clone())
                .with_meta("prompt_preview", ellipsize(&prompt, 100));
        }
        info!(repo = %ctx.target.full_name, skill = %self.skill, "running skill");
        let args = claude_args(&prompt);
        let cwd = ctx.path().to_path_buf();
        let name = self.name();
        let skill = self.skill.clone();

        bridge::run_action(ctx, name, self.timeout, async {
            match capture(&self.program, &args, &cwd).await {
                Ok(out) if self.condition.is_some() && out.stdout.contains(&self.skip_marker) => {
                    out.annotate(
                        Outcome::skipped(format!("Skipped: {}", self.skip_marker)).with_action(name),
                    )
                }
                Ok(out) if out.succeeded() => out.annotate(
                    Outcome::success(format!("Skill /{} completed", skill)).with_action(name),
                ),
                Ok(out) => out.annotate(
                    Outcome::failed(format!(
                        "Skill /{} failed with exit code {}",
                        skill,
                        out.code.unwrap_or(-1)
                    ))
                    .with_action(name),
                ),
                Err(e) => spawn_failure(name, &e, Some(CLAUDE_NOT_FOUND)),
            }
        })
        .with_meta("skill", self.skill.clone())
    }

    fn preview_message(&self, _ctx: &ExecutionContext) -> String {
        match &self.condition {
            Some(condition) => format!(
                "Would run Claude CLI with skill: {} (condition: {})",
                self.invocation(),
                ellipsize(condition, 50)
            ),
            None => format!("Would run Claude CLI with skill: {}", self.invocation()),
        }
    }
}

/// Run a `gh` subcommand in the checkout.
pub struct GhCli {
    args: Vec<String>,
    timeout: Duration,
}

impl GhCli {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_GH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Action for GhCli {
    fn name(&self) -> &str {
        "gh-cli"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx);
        }
        let cwd = ctx.path().to_path_buf();
        let name = self.name();

        bridge::run_action(ctx, name, self.timeout, async {
            match capture("gh", &self.args, &cwd).await {
                Ok(out) if out.succeeded() => {
                    out.annotate(Outcome::success("gh command succeeded").with_action(name))
                }
                Ok(out) => out.annotate(
                    Outcome::failed(format!("gh command failed: {}", out.stderr.trim()))
                        .with_action(name),
                ),
                Err(e) => spawn_failure(name, &e, Some(GH_NOT_FOUND)),
            }
        })
        .with_meta("args", self.args.join(" "))
    }

    fn preview_message(&self, _ctx: &ExecutionContext) -> String {
        format!("Would run: gh {}", self.args.join(" "))
    }
}
