//! Per-target execution state and the tri-state [`Outcome`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::target::Target;

/// Longest tool output kept in outcome metadata.
pub const MAX_OUTPUT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Failed,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Skipped => write!(f, "skipped"),
            OutcomeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one action, or of one whole pipeline run, for one target.
///
/// Built with the consuming `with_*` methods and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    status: OutcomeStatus,
    message: String,
    action: Option<String>,
    metadata: Map<String, Value>,
    at: DateTime<Utc>,
}

impl Outcome {
    fn new(status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            action: None,
            metadata: Map::new(),
            at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Success, message)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Skipped, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Failed, message)
    }

    /// Tag the outcome with the name of the action that produced it.
    pub fn with_action(mut self, name: impl Into<String>) -> Self {
        self.action = Some(name.into());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Attach tool output, cut to [`MAX_OUTPUT_CHARS`].
    pub fn with_output(self, key: &str, output: &str) -> Self {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return self;
        }
        self.with_meta(key, truncate_chars(trimmed, MAX_OUTPUT_CHARS))
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn is_skipped(&self) -> bool {
        self.status == OutcomeStatus::Skipped
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

/// Cut `s` to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Run-wide mode switches copied into every context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    /// Describe what would happen without touching anything.
    pub preview_only: bool,
    /// Dispatch every target even when the pipeline's guards fail.
    pub ignore_guards: bool,
    /// Never prompt.
    pub auto_confirm: bool,
}

/// Everything one target's pipeline run can see and change.
///
/// Exactly one exists per target per run and it is owned by whichever worker
/// is running that target.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub target: Target,
    pub base_dir: PathBuf,
    pub flags: RunFlags,
    variables: Map<String, Value>,
    outcomes: Vec<Outcome>,
}

impl ExecutionContext {
    pub fn new(target: Target, base_dir: impl Into<PathBuf>, flags: RunFlags) -> Self {
        Self {
            target,
            base_dir: base_dir.into(),
            flags,
            variables: Map::new(),
            outcomes: Vec::new(),
        }
    }

    /// Local checkout path of the target.
    pub fn path(&self) -> &Path {
        &self.target.path
    }

    pub fn preview_only(&self) -> bool {
        self.flags.preview_only
    }

    pub fn ignore_guards(&self) -> bool {
        self.flags.ignore_guards
    }

    pub fn auto_confirm(&self) -> bool {
        self.flags.auto_confirm
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn var(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// String variable, or `None` if absent or not a string.
    pub fn var_str(&self, key: &str) -> Option<&str> {
        self.variables.get(key).and_then(Value::as_str)
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Append an outcome to this target's log.
    pub fn record(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.outcomes.last()
    }
}
