//! Read-only views of a local git checkout via libgit2.

use std::path::Path;

use anyhow::{Context, Result};
use git2::{BranchType, Repository, StatusOptions};

/// An opened local checkout.
pub struct Checkout {
    repo: Repository,
}

impl Checkout {
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)
            .with_context(|| format!("Failed to open git repository at {}", path.display()))?;
        Ok(Self { repo })
    }

    /// Short name of the checked-out branch, or `None` when HEAD is detached.
    ///
    /// An unborn branch (fresh `git init`) still reports its name.
    pub fn current_branch(&self) -> Result<Option<String>> {
        if self.repo.head_detached().context("Failed to read HEAD")? {
            return Ok(None);
        }
        match self.repo.head() {
            Ok(head) => Ok(head.shorthand().map(str::to_string)),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(e) => Err(e).context("Failed to resolve HEAD"),
        }
    }

    /// True when `git status --porcelain` would print anything, untracked
    /// files included.
    pub fn is_dirty(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(false);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .context("Failed to read working tree status")?;
        Ok(!statuses.is_empty())
    }

    /// Name of the upstream of `branch` (e.g. `origin/main`), if configured
    /// and resolvable.
    pub fn upstream(&self, branch: &str) -> Result<Option<String>> {
        let local = match self.repo.find_branch(branch, BranchType::Local) {
            Ok(b) => b,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to look up local branch"),
        };
        match local.upstream() {
            Ok(up) => Ok(up.name()?.map(str::to_string)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to resolve upstream"),
        }
    }

    /// `(ahead, behind)` of `branch` relative to its upstream.
    pub fn ahead_behind(&self, branch: &str) -> Result<(usize, usize)> {
        let local = self
            .repo
            .find_branch(branch, BranchType::Local)
            .context("Failed to look up local branch")?;
        let local_oid = local
            .get()
            .target()
            .context("Local branch has no commits")?;
        let upstream = local.upstream().context("Branch has no upstream")?;
        let upstream_oid = upstream
            .get()
            .target()
            .context("Upstream reference has no target")?;
        self.repo
            .graph_ahead_behind(local_oid, upstream_oid)
            .context("Failed to compare with upstream")
    }
}

/// Whether `path` or any ancestor is a git work tree.
pub fn inside_work_tree(path: &Path) -> bool {
    Repository::discover(path).is_ok_and(|repo| !repo.is_bare())
}
