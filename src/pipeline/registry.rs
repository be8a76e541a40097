//! The built-in pipelines, as one static table.
//!
//! | Name                 | What it does                                             |
//! |----------------------|----------------------------------------------------------|
//! | `sync`               | clone missing checkouts, pull clean ones                 |
//! | `clone`              | clone missing checkouts                                  |
//! | `pull`               | pull clean checkouts                                     |
//! | `status`             | classify every checkout, print a distribution            |
//! | `commit-push`        | stage, commit and push dirty checkouts                   |
//! | `sandbox-enable`     | turn on the Claude sandbox in local settings             |
//! | `settings-clean`     | run the settings cleaner                                 |
//! | `description-sync`   | copy the README tagline into the GitHub description      |
//! | `claude-exec`        | run a Claude prompt in each checkout                     |
//! | `readme-generator`   | run the readme-generator skill, optionally conditional   |
//! | `settings-optimizer` | run the claude-settings-optimizer skill                  |

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use super::Pipeline;
use crate::action::{
    ClaudeCli, ConditionalSkill, DescriptionSync, GitAdd, GitClone, GitCommit, GitPull, GitPush,
    JsonPatch, Subprocess, action,
};
use crate::config::Timeouts;
use crate::errors::FleetError;
use crate::predicate::{FileExists, NotArchived, RepoClean, RepoExists, all_of, guard, not};
use crate::status::{StatusProbe, StatusTally};
use crate::ui;

/// Caller-supplied knobs the builders draw from.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub prompt: Option<String>,
    pub condition: Option<String>,
    pub mode: String,
    pub fetch: bool,
    pub claude_cmd: String,
    pub timeouts: Timeouts,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            prompt: None,
            condition: None,
            mode: "analyze".to_string(),
            fetch: true,
            claude_cmd: "claude".to_string(),
            timeouts: Timeouts::default(),
        }
    }
}

/// One registry row.
pub struct PipelineSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub build: fn(&PipelineOptions) -> Result<Pipeline>,
}

static PIPELINES: &[PipelineSpec] = &[
    PipelineSpec {
        name: "sync",
        description: "Clone new repos and pull updates for existing repos",
        build: sync,
    },
    PipelineSpec {
        name: "clone",
        description: "Clone repositories that don't exist locally",
        build: clone,
    },
    PipelineSpec {
        name: "pull",
        description: "Pull updates for repositories that exist locally",
        build: pull,
    },
    PipelineSpec {
        name: "status",
        description: "Report repository synchronization status",
        build: status,
    },
    PipelineSpec {
        name: "commit-push",
        description: "Stage, commit and push local changes",
        build: commit_push,
    },
    PipelineSpec {
        name: "sandbox-enable",
        description: "Enable Claude Code sandbox mode with auto-allow bash",
        build: sandbox_enable,
    },
    PipelineSpec {
        name: "settings-clean",
        description: "Analyze and clean Claude Code settings",
        build: settings_clean,
    },
    PipelineSpec {
        name: "description-sync",
        description: "Sync GitHub repo description with README tagline",
        build: description_sync,
    },
    PipelineSpec {
        name: "claude-exec",
        description: "Execute a Claude prompt in each repository (supports skills via /skill-name)",
        build: claude_exec,
    },
    PipelineSpec {
        name: "readme-generator",
        description: "Generate README.md using the readme-generator skill",
        build: readme_generator,
    },
    PipelineSpec {
        name: "settings-optimizer",
        description: "Optimize Claude Code settings using the claude-settings-optimizer skill",
        build: settings_optimizer,
    },
];

/// Every registered pipeline, in listing order.
pub fn registered() -> &'static [PipelineSpec] {
    PIPELINES
}

pub fn find_pipeline(name: &str) -> Option<&'static PipelineSpec> {
    PIPELINES.iter().find(|spec| spec.name == name)
}

/// Look up `name` and build it with `options`.
pub fn build_pipeline(name: &str, options: &PipelineOptions) -> Result<Pipeline> {
    let spec = find_pipeline(name).ok_or_else(|| FleetError::UnknownPipeline {
        name: name.to_string(),
    })?;
    (spec.build)(options)
}

fn sync(opts: &PipelineOptions) -> Result<Pipeline> {
    Ok(Pipeline::new("sync", find_description("sync"))
        .branch(
            not(guard(RepoExists)),
            action(GitClone::new().with_timeout(opts.timeouts.clone)),
            None,
        )
        .branch(
            all_of([guard(RepoExists), guard(RepoClean)]),
            action(GitPull::new().with_timeout(opts.timeouts.pull)),
            None,
        ))
}

fn clone(opts: &PipelineOptions) -> Result<Pipeline> {
    Ok(Pipeline::new("clone", find_description("clone"))
        .when(not(guard(RepoExists)))
        .then(action(GitClone::new().with_timeout(opts.timeouts.clone))))
}

fn pull(opts: &PipelineOptions) -> Result<Pipeline> {
    Ok(Pipeline::new("pull", find_description("pull"))
        .when(guard(RepoExists))
        .when(guard(RepoClean))
        .then(action(GitPull::new().with_timeout(opts.timeouts.pull))))
}

fn status(opts: &PipelineOptions) -> Result<Pipeline> {
    let tally = Arc::new(StatusTally::new());
    let probe = StatusProbe::new(Arc::clone(&tally), opts.fetch).with_fetch_timeout(opts.timeouts.fetch);
    Ok(Pipeline::new("status", find_description("status"))
        .progress_only()
        .default_workers(8)
        .then(action(probe))
        .on_batch_complete(move || ui::report::print_status_distribution(&tally)))
}

fn commit_push(opts: &PipelineOptions) -> Result<Pipeline> {
    Ok(Pipeline::new("commit-push", find_description("commit-push"))
        .when(guard(RepoExists))
        .when(not(guard(RepoClean)))
        .then(action(GitAdd::new(".")))
        .then(action(GitCommit))
        .then(action(GitPush::new().with_timeout(opts.timeouts.push))))
}

fn sandbox_enable(_opts: &PipelineOptions) -> Result<Pipeline> {
    Ok(Pipeline::new("sandbox-enable", find_description("sandbox-enable"))
        .when(guard(RepoExists))
        .then(action(JsonPatch::new(
            ".claude/settings.local.json",
            json!({
                "sandbox": {
                    "enabled": true,
                    "autoAllowBashIfSandboxed": true
                }
            }),
        ))))
}

fn settings_clean(opts: &PipelineOptions) -> Result<Pipeline> {
    let command = [
        "uv".to_string(),
        "run".to_string(),
        "python".to_string(),
        "-m".to_string(),
        "settings_cleaner".to_string(),
        format!("--mode={}", opts.mode),
    ];
    Ok(Pipeline::new("settings-clean", find_description("settings-clean"))
        .when(guard(RepoExists))
        .then(action(Subprocess::new(command).with_timeout(opts.timeouts.subprocess))))
}

fn description_sync(_opts: &PipelineOptions) -> Result<Pipeline> {
    Ok(Pipeline::new("description-sync", find_description("description-sync"))
        .when(guard(NotArchived))
        .when(guard(RepoExists))
        .when(guard(FileExists::new("README.md")))
        .then(action(DescriptionSync)))
}

fn claude_exec(opts: &PipelineOptions) -> Result<Pipeline> {
    let prompt = opts
        .prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| FleetError::MissingArgument {
            pipeline: "claude-exec".into(),
            flag: "--prompt".into(),
        })?;
    let claude = ClaudeCli::new(prompt)
        .with_program(opts.claude_cmd.as_str())
        .with_timeout(opts.timeouts.claude);
    Ok(Pipeline::new("claude-exec", find_description("claude-exec"))
        .sequential_only()
        .progress_only()
        .when(guard(RepoExists))
        .then(action(claude)))
}

fn readme_generator(opts: &PipelineOptions) -> Result<Pipeline> {
    let skill = ConditionalSkill::new("readme-generator")
        .with_condition(opts.condition.clone())
        .with_skip_marker("Skipped - condition not met")
        .with_program(opts.claude_cmd.as_str())
        .with_timeout(opts.timeouts.claude);
    Ok(Pipeline::new("readme-generator", find_description("readme-generator"))
        .sequential_only()
        .when(guard(RepoExists))
        .then(action(skill)))
}

fn settings_optimizer(opts: &PipelineOptions) -> Result<Pipeline> {
    let skill = ConditionalSkill::new("claude-settings-optimizer")
        .with_args(format!("--mode {}", opts.mode))
        .with_program(opts.claude_cmd.as_str())
        .with_timeout(opts.timeouts.claude);
    Ok(Pipeline::new("settings-optimizer", find_description("settings-optimizer"))
        .sequential_only()
        .when(guard(RepoExists))
        .then(action(skill)))
}

fn find_description(name: &str) -> &'static str {
    find_pipeline(name).map(|spec| spec.description).unwrap_or_default()
}
