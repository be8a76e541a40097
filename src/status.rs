//! Synchronization status of a checkout against its upstream.
//!
//! [`classify`] assigns every checkout exactly one [`SyncState`], first match
//! wins:
//!
//! | Order | Condition                          | State         |
//! |-------|------------------------------------|---------------|
//! | 1     | no checkout at the path            | `NotCloned`   |
//! | 2     | HEAD is detached                   | `Detached`    |
//! | 3     | branch has no upstream             | `NoRemote`    |
//! | 4     | working tree has changes           | `Uncommitted` |
//! | 5     | ahead and behind                   | `Diverged`    |
//! | 6     | behind                             | `Unpulled`    |
//! | 7     | ahead                              | `Unpushed`    |
//! | 8     | otherwise                          | `InSync`      |
//!
//! Dirtiness outranks divergence. Read errors never abort a batch: they
//! degrade to the most conservative state reachable at that point.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::action::Action;
use crate::action::git::DEFAULT_FETCH_TIMEOUT;
use crate::action::process::capture;
use crate::bridge;
use crate::context::{ExecutionContext, Outcome};
use crate::vcs::Checkout;

/// Where a checkout stands relative to its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NotCloned,
    Detached,
    NoRemote,
    Uncommitted,
    Diverged { ahead: usize, behind: usize },
    Unpulled { behind: usize },
    Unpushed { ahead: usize },
    InSync,
}

impl SyncState {
    /// Category labels in report order.
    pub const CATEGORY_ORDER: [&'static str; 8] = [
        "In sync",
        "Unpushed changes",
        "Unpulled changes",
        "Diverged",
        "Uncommitted changes",
        "Detached HEAD",
        "No remote tracking",
        "Not cloned",
    ];

    /// Category label, without counts.
    pub fn label(&self) -> &'static str {
        match self {
            SyncState::InSync => "In sync",
            SyncState::Unpushed { .. } => "Unpushed changes",
            SyncState::Unpulled { .. } => "Unpulled changes",
            SyncState::Diverged { .. } => "Diverged",
            SyncState::Uncommitted => "Uncommitted changes",
            SyncState::Detached => "Detached HEAD",
            SyncState::NoRemote => "No remote tracking",
            SyncState::NotCloned => "Not cloned",
        }
    }

    /// Whether a human needs to do something about this checkout.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            SyncState::Uncommitted
                | SyncState::Unpushed { .. }
                | SyncState::Unpulled { .. }
                | SyncState::Diverged { .. }
                | SyncState::NotCloned
        )
    }

    /// Commit counts in the form used next to a repository name.
    pub fn counts(&self) -> Option<String> {
        match self {
            SyncState::Diverged { ahead, behind } => Some(format!("ahead {}, behind {}", ahead, behind)),
            SyncState::Unpulled { behind } => Some(format!("behind {}", behind)),
            SyncState::Unpushed { ahead } => Some(format!("ahead {}", ahead)),
            _ => None,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.counts() {
            Some(counts) => write!(f, "{} ({})", self.label(), counts),
            None => f.write_str(self.label()),
        }
    }
}

/// Facts [`classify`] reads from one opened checkout.
pub trait CheckoutFacts {
    /// `None` when HEAD is detached.
    fn current_branch(&self) -> Result<Option<String>>;

    fn upstream(&self, branch: &str) -> Result<Option<String>>;

    fn is_dirty(&self) -> Result<bool>;

    /// `(ahead, behind)` against the upstream.
    fn ahead_behind(&self, branch: &str) -> Result<(usize, usize)>;
}

/// Locates and opens checkouts for [`classify`].
pub trait SyncProbe {
    type Facts: CheckoutFacts;

    fn has_checkout(&self, path: &Path) -> bool;

    /// Opened once per classification.
    fn open(&self, path: &Path) -> Result<Self::Facts>;

    /// Refresh remote-tracking refs. Failures are the probe's to report.
    fn refresh(&self, path: &Path);
}

/// Decide the [`SyncState`] of the checkout at `path`.
pub fn classify<P: SyncProbe>(probe: &P, path: &Path, fetch: bool) -> SyncState {
    if !probe.has_checkout(path) {
        return SyncState::NotCloned;
    }

    let facts = match probe.open(path) {
        Ok(facts) => facts,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot open checkout");
            return SyncState::NoRemote;
        }
    };

    let branch = match facts.current_branch() {
        Ok(Some(branch)) => branch,
        Ok(None) => return SyncState::Detached,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot read current branch");
            return SyncState::NoRemote;
        }
    };

    match facts.upstream(&branch) {
        Ok(Some(_)) => {}
        Ok(None) => return SyncState::NoRemote,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot read upstream");
            return SyncState::NoRemote;
        }
    }

    if fetch {
        probe.refresh(path);
    }

    let dirty = facts.is_dirty().unwrap_or_else(|e| {
        debug!(path = %path.display(), error = %e, "cannot read working tree status");
        true
    });
    if dirty {
        return SyncState::Uncommitted;
    }

    let (ahead, behind) = match facts.ahead_behind(&branch) {
        Ok(counts) => counts,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot compare with upstream");
            return SyncState::NoRemote;
        }
    };

    match (ahead, behind) {
        (0, 0) => SyncState::InSync,
        (0, behind) => SyncState::Unpulled { behind },
        (ahead, 0) => SyncState::Unpushed { ahead },
        (ahead, behind) => SyncState::Diverged { ahead, behind },
    }
}

impl CheckoutFacts for Checkout {
    fn current_branch(&self) -> Result<Option<String>> {
        Checkout::current_branch(self)
    }

    fn upstream(&self, branch: &str) -> Result<Option<String>> {
        Checkout::upstream(self, branch)
    }

    fn is_dirty(&self) -> Result<bool> {
        Checkout::is_dirty(self)
    }

    fn ahead_behind(&self, branch: &str) -> Result<(usize, usize)> {
        Checkout::ahead_behind(self, branch)
    }
}

/// [`SyncProbe`] backed by libgit2, fetching with the `git` binary.
#[derive(Debug, Clone)]
pub struct GitProbe {
    fetch_timeout: Duration,
}

impl GitProbe {
    pub fn new() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

impl Default for GitProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncProbe for GitProbe {
    type Facts = Checkout;

    fn has_checkout(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn open(&self, path: &Path) -> Result<Checkout> {
        Checkout::open(path)
    }

    fn refresh(&self, path: &Path) {
        let args = vec!["fetch".to_string(), "--quiet".to_string()];
        match bridge::block_on_with_timeout(self.fetch_timeout, capture("git", &args, path)) {
            Ok(Ok(out)) if out.succeeded() => {}
            Ok(Ok(out)) => {
                warn!(path = %path.display(), stderr = %out.stderr.trim(), "git fetch failed")
            }
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "git fetch failed"),
            Err(e) => warn!(path = %path.display(), error = %e, "git fetch did not finish"),
        }
    }
}

/// Thread-safe collection of classified targets, shared by every worker
/// of a status batch.
#[derive(Debug, Default)]
pub struct StatusTally {
    entries: Mutex<Vec<(String, SyncState)>>,
}

impl StatusTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, repo: impl Into<String>, state: SyncState) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push((repo.into(), state));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-empty categories in report order, each with its repositories in
    /// the order they were recorded.
    pub fn by_category(&self) -> Vec<(&'static str, Vec<(String, SyncState)>)> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        SyncState::CATEGORY_ORDER
            .iter()
            .filter_map(|label| {
                let members: Vec<_> = entries
                    .iter()
                    .filter(|(_, state)| state.label() == *label)
                    .cloned()
                    .collect();
                (!members.is_empty()).then_some((*label, members))
            })
            .collect()
    }
}

/// Classify the target and record it into a shared [`StatusTally`]. Always
/// succeeds: the state is the message.
pub struct StatusProbe {
    tally: Arc<StatusTally>,
    fetch: bool,
    probe: GitProbe,
}

impl StatusProbe {
    pub fn new(tally: Arc<StatusTally>, fetch: bool) -> Self {
        Self {
            tally,
            fetch,
            probe: GitProbe::new(),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.probe = self.probe.with_fetch_timeout(timeout);
        self
    }

    fn not_cloned(&self, ctx: &ExecutionContext) -> Outcome {
        self.tally.record(ctx.target.full_name.clone(), SyncState::NotCloned);
        Outcome::success(SyncState::NotCloned.to_string())
            .with_action(self.name())
            .with_meta("category", SyncState::NotCloned.label())
    }
}

impl Action for StatusProbe {
    fn name(&self) -> &str {
        "status-check"
    }

    #[instrument(skip_all, fields(repo = %ctx.target.full_name))]
    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if !self.probe.has_checkout(ctx.path()) {
            return self.not_cloned(ctx);
        }

        let state = classify(&self.probe, ctx.path(), self.fetch);
        self.tally.record(ctx.target.full_name.clone(), state);
        let mut outcome = Outcome::success(state.to_string())
            .with_action(self.name())
            .with_meta("category", state.label());
        if let SyncState::Diverged { ahead, behind } = state {
            outcome = outcome.with_meta("ahead", ahead).with_meta("behind", behind);
        }
        outcome
    }

    /// A missing checkout is tallied even in a dry run; nothing is read
    /// from an existing one.
    fn preview(&self, ctx: &ExecutionContext) -> Outcome {
        if !self.probe.has_checkout(ctx.path()) {
            return self.not_cloned(ctx);
        }
        Outcome::success(self.preview_message(ctx))
            .with_action(self.name())
            .with_meta("dry_run", true)
    }

    fn preview_message(&self, _ctx: &ExecutionContext) -> String {
        "Would check status".to_string()
    }
}
