//! `gitfleet run <pipeline>` and `gitfleet status`.

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use gitfleet::action::git::COMMIT_MESSAGE_VAR;
use gitfleet::config::{CliOverrides, FleetConfig};
use gitfleet::errors::FleetError;
use gitfleet::executor::{Executor, ExecutorOptions};
use gitfleet::filter::TargetFilter;
use gitfleet::github::GitHubSource;
use gitfleet::pipeline::{PipelineOptions, build_pipeline};
use gitfleet::signal;
use gitfleet::target::{LocalSource, Target, TargetSource};
use gitfleet::ui::ConsoleReporter;

use super::super::{Cli, RunArgs};

pub fn cmd_run(cli: &Cli, base_dir: &Path, name: &str, args: &RunArgs) -> Result<i32> {
    let config = FleetConfig::resolve(base_dir.to_path_buf(), &overrides(cli))?;

    let mut options = PipelineOptions {
        prompt: args.prompt.clone(),
        condition: args.condition.clone(),
        fetch: config.fetch && !args.no_fetch,
        claude_cmd: config.claude_cmd.clone(),
        timeouts: config.timeouts,
        ..Default::default()
    };
    if let Some(mode) = &args.mode {
        options.mode = mode.clone();
    }
    let pipeline = build_pipeline(name, &options)?;

    config.ensure_outside_work_tree()?;
    if pipeline.hints().requires_token && config.token.is_none() {
        return Err(FleetError::TokenRequired {
            pipeline: pipeline.name().to_string(),
        }
        .into());
    }

    let filter = TargetFilter {
        repos: cli.repos.clone(),
        orgs: cli.orgs.clone(),
        patterns: cli.patterns.clone(),
        include_forks: config.include_forks,
        include_archived: config.include_archived,
        private_only: cli.private_only,
        public_only: cli.public_only,
    }
    .compile()?;

    let targets = list_targets(&config, args.local)?;
    let listed = targets.len();
    let targets = filter.apply(targets);
    debug!(listed, kept = targets.len(), "filtered targets");

    let mut exec_options = ExecutorOptions::default()
        .preview_only(cli.dry_run)
        .ignore_guards(cli.force)
        .auto_confirm(cli.yes)
        .with_max_workers(config.workers)
        .sequential(config.sequential);
    if let Some(message) = &args.message {
        exec_options = exec_options.with_variable(COMMIT_MESSAGE_VAR, message.clone());
    }

    let cancel = signal::install()?;
    let executor = Executor::new(&config.base_dir, exec_options).with_cancel_flag(cancel);
    let mut reporter = ConsoleReporter::new(cli.verbose);
    let report = executor.execute(&pipeline, targets, &mut reporter);

    Ok(report.exit_code())
}

fn overrides(cli: &Cli) -> CliOverrides {
    CliOverrides {
        config: cli.config.clone(),
        username: cli.username.clone(),
        token: cli.token.clone(),
        workers: cli.workers,
        sequential: cli.sequential,
        include_forks: cli.include_forks,
        include_archived: cli.include_archived,
    }
}

fn list_targets(config: &FleetConfig, local: bool) -> Result<Vec<Target>> {
    if local {
        return LocalSource::new(&config.base_dir).list();
    }
    let username = config
        .username
        .clone()
        .ok_or(FleetError::UsernameRequired)?;
    GitHubSource::new(&config.base_dir, username)
        .with_token(config.token.clone())
        .with_orgs(config.orgs.clone())
        .list()
}
