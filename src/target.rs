//! Target descriptors and the sources that produce them.
//!
//! A [`Target`] is one repository the fleet operates on: its provider
//! identity, the local path it lives (or will live) at, and the handful of
//! provider flags guards look at. Targets are immutable for a run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

/// Repository visibility as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// One repository in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Short repository name, also the directory name under the base dir.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    pub owner: String,
    /// Local checkout path. May not exist yet (e.g. before a clone).
    pub path: PathBuf,
    pub visibility: Visibility,
    pub archived: bool,
    pub fork: bool,
    pub default_branch: String,
    pub language: Option<String>,
    pub description: Option<String>,
    pub clone_url: Option<String>,
}

impl Target {
    /// A public, non-fork target on `main` with no owner.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
            owner: String::new(),
            path: path.into(),
            visibility: Visibility::Public,
            archived: false,
            fork: false,
            default_branch: "main".to_string(),
            language: None,
            description: None,
            clone_url: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self.full_name = format!("{}/{}", self.owner, self.name);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_flags(mut self, archived: bool, fork: bool) -> Self {
        self.archived = archived;
        self.fork = fork;
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_clone_url(mut self, url: impl Into<String>) -> Self {
        self.clone_url = Some(url.into());
        self
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }
}

/// Anything that can produce the ordered list of targets for a run.
///
/// Sources do their own I/O. The executor never lists targets itself.
pub trait TargetSource {
    fn list(&self) -> Result<Vec<Target>>;
}

/// Lists existing checkouts directly below a base directory.
///
/// Used for offline runs. Owner and default branch are recovered from the
/// checkout itself where possible.
pub struct LocalSource {
    base_dir: PathBuf,
}

impl LocalSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl TargetSource for LocalSource {
    fn list(&self) -> Result<Vec<Target>> {
        let mut targets = Vec::new();
        let remote_re = Regex::new(r"[:/]([^/:]+)/([^/]+?)(?:\.git)?/?$")
            .context("Failed to compile remote URL pattern")?;

        for entry in WalkDir::new(&self.base_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| {
                format!("Failed to scan base directory {}", self.base_dir.display())
            })?;
            if !entry.file_type().is_dir() || !entry.path().join(".git").exists() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            targets.push(describe_checkout(&name, entry.path(), &remote_re));
        }

        debug!(count = targets.len(), base_dir = %self.base_dir.display(), "scanned local checkouts");
        Ok(targets)
    }
}

fn describe_checkout(name: &str, path: &Path, remote_re: &Regex) -> Target {
    let mut target = Target::new(name, path);
    let Ok(repo) = git2::Repository::open(path) else {
        return target;
    };

    if let Ok(head) = repo.head()
        && let Some(branch) = head.shorthand()
        && head.is_branch()
    {
        target.default_branch = branch.to_string();
    }

    if let Ok(remote) = repo.find_remote("origin")
        && let Some(url) = remote.url()
    {
        target.clone_url = Some(url.to_string());
        if let Some(caps) = remote_re.captures(url) {
            target = target.with_owner(&caps[1]);
        }
    }

    target
}
