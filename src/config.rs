//! Layered configuration: `fleet.toml` → environment → CLI flags.
//!
//! The file is looked up as `--config <path>`, then `<base_dir>/fleet.toml`,
//! then `<config_dir>/gitfleet/fleet.toml`. Every key is optional.
//!
//! ```toml
//! [github]
//! username = "octocat"
//! orgs = ["acme"]
//!
//! [defaults]
//! workers = 8
//! sequential = false
//! fetch = true
//! claude_cmd = "claude"
//!
//! [timeouts]
//! clone = 300
//! pull = 120
//! fetch = 30
//! push = 120
//! subprocess = 60
//! claude = 300
//!
//! [filter]
//! include_forks = false
//! include_archived = false
//! ```
//!
//! `GITHUB_USERNAME`, `GITHUB_TOKEN` and `CLAUDE_CMD` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::FleetError;
use crate::vcs;

pub const CONFIG_FILE_NAME: &str = "fleet.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Prefer `GITHUB_TOKEN`; a token here is flagged by `validate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Organizations listed in addition to the user's own repositories.
    #[serde(default)]
    pub orgs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// Worker pool size. Unset means the pipeline's preference, then CPU count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default)]
    pub sequential: bool,
    /// Refresh remote-tracking refs before classifying status.
    #[serde(default = "default_true")]
    pub fetch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_cmd: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            workers: None,
            sequential: false,
            fetch: true,
            claude_cmd: None,
        }
    }
}

/// Per-operation timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_clone_secs")]
    pub clone: u64,
    #[serde(default = "default_pull_secs")]
    pub pull: u64,
    #[serde(default = "default_fetch_secs")]
    pub fetch: u64,
    #[serde(default = "default_push_secs")]
    pub push: u64,
    #[serde(default = "default_subprocess_secs")]
    pub subprocess: u64,
    #[serde(default = "default_claude_secs")]
    pub claude: u64,
}

fn default_clone_secs() -> u64 {
    300
}

fn default_pull_secs() -> u64 {
    120
}

fn default_fetch_secs() -> u64 {
    30
}

fn default_push_secs() -> u64 {
    120
}

fn default_subprocess_secs() -> u64 {
    60
}

fn default_claude_secs() -> u64 {
    300
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            clone: default_clone_secs(),
            pull: default_pull_secs(),
            fetch: default_fetch_secs(),
            push: default_push_secs(),
            subprocess: default_subprocess_secs(),
            claude: default_claude_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSection {
    #[serde(default)]
    pub include_forks: bool,
    #[serde(default)]
    pub include_archived: bool,
}

/// The complete fleet.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetToml {
    #[serde(default)]
    pub github: GithubSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub filter: FilterSection,
}

impl FleetToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| FleetError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|e| {
            FleetError::ConfigParse {
                path: path.to_path_buf(),
                message: format!("{:#}", e),
            }
            .into()
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize fleet.toml")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Problems worth telling the user about. An empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.workers == Some(0) {
            warnings.push("defaults.workers is 0; at least one worker is always used".to_string());
        }
        let t = &self.timeouts;
        for (name, secs) in [
            ("clone", t.clone),
            ("pull", t.pull),
            ("fetch", t.fetch),
            ("push", t.push),
            ("subprocess", t.subprocess),
            ("claude", t.claude),
        ] {
            if secs == 0 {
                warnings.push(format!("timeouts.{} is 0; every such call will time out", name));
            }
        }
        if self.github.token.is_some() {
            warnings.push(
                "github.token is stored in plain text; prefer the GITHUB_TOKEN environment variable"
                    .to_string(),
            );
        }
        if self
            .defaults
            .claude_cmd
            .as_deref()
            .is_some_and(|c| c.trim().is_empty())
        {
            warnings.push("defaults.claude_cmd is empty".to_string());
        }

        warnings
    }
}

/// Resolved per-operation timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub clone: Duration,
    pub pull: Duration,
    pub fetch: Duration,
    pub push: Duration,
    pub subprocess: Duration,
    pub claude: Duration,
}

impl From<&TimeoutsSection> for Timeouts {
    fn from(section: &TimeoutsSection) -> Self {
        Self {
            clone: Duration::from_secs(section.clone),
            pull: Duration::from_secs(section.pull),
            fetch: Duration::from_secs(section.fetch),
            push: Duration::from_secs(section.push),
            subprocess: Duration::from_secs(section.subprocess),
            claude: Duration::from_secs(section.claude),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutsSection::default())
    }
}

/// Values supplied on the command line. `None`/`false` defers to the lower
/// layers.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub username: Option<String>,
    pub token: Option<String>,
    pub workers: Option<usize>,
    pub sequential: bool,
    pub include_forks: bool,
    pub include_archived: bool,
}

/// Configuration with every layer applied.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub base_dir: PathBuf,
    /// File the settings came from, if any.
    pub source: Option<PathBuf>,
    pub toml: FleetToml,
    pub username: Option<String>,
    pub token: Option<String>,
    pub orgs: Vec<String>,
    pub claude_cmd: String,
    pub workers: Option<usize>,
    pub sequential: bool,
    pub fetch: bool,
    pub include_forks: bool,
    pub include_archived: bool,
    pub timeouts: Timeouts,
}

impl FleetConfig {
    pub fn resolve(base_dir: PathBuf, cli: &CliOverrides) -> Result<Self> {
        let source = locate(&base_dir, cli.config.as_deref());
        let toml = match &source {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                FleetToml::load(path)?
            }
            None => FleetToml::default(),
        };

        let username = cli
            .username
            .clone()
            .or_else(|| env_var("GITHUB_USERNAME"))
            .or_else(|| toml.github.username.clone());
        let token = cli
            .token
            .clone()
            .or_else(|| env_var("GITHUB_TOKEN"))
            .or_else(|| toml.github.token.clone());
        let claude_cmd = env_var("CLAUDE_CMD")
            .or_else(|| toml.defaults.claude_cmd.clone())
            .unwrap_or_else(|| "claude".to_string());

        Ok(Self {
            base_dir,
            source,
            username,
            token,
            orgs: toml.github.orgs.clone(),
            claude_cmd,
            workers: cli.workers.or(toml.defaults.workers).map(|w| w.max(1)),
            sequential: cli.sequential || toml.defaults.sequential,
            fetch: toml.defaults.fetch,
            include_forks: cli.include_forks || toml.filter.include_forks,
            include_archived: cli.include_archived || toml.filter.include_archived,
            timeouts: Timeouts::from(&toml.timeouts),
            toml,
        })
    }

    /// Refuse to treat a directory inside a git work tree as the fleet root.
    pub fn ensure_outside_work_tree(&self) -> Result<()> {
        if vcs::inside_work_tree(&self.base_dir) {
            return Err(FleetError::InsideGitRepository {
                path: self.base_dir.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Where `fleet.toml` would be read from.
pub fn locate(base_dir: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = base_dir.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    user_config_path().filter(|p| p.exists())
}

/// `<config_dir>/gitfleet/fleet.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gitfleet").join(CONFIG_FILE_NAME))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
