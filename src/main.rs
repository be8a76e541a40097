use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;

use gitfleet::exit_codes;

mod cmd;

#[derive(Parser)]
#[command(name = "gitfleet")]
#[command(version, about = "Run composable pipelines across a fleet of git repositories")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip the confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Show what would happen without changing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Run even when a pipeline's conditions are not met
    #[arg(long, global = true)]
    pub force: bool,

    /// Number of parallel workers
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Process one repository at a time
    #[arg(long, global = true)]
    pub sequential: bool,

    /// Only these repositories (repeatable)
    #[arg(long = "repo", global = true)]
    pub repos: Vec<String>,

    /// Only repositories owned by these organizations (repeatable)
    #[arg(long = "org", global = true)]
    pub orgs: Vec<String>,

    /// Only repositories whose name matches this glob (repeatable)
    #[arg(long = "pattern", global = true)]
    pub patterns: Vec<String>,

    #[arg(long, global = true)]
    pub include_forks: bool,

    #[arg(long, global = true)]
    pub include_archived: bool,

    #[arg(long, global = true)]
    pub private_only: bool,

    #[arg(long, global = true)]
    pub public_only: bool,

    /// GitHub username (overrides GITHUB_USERNAME)
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// GitHub token (overrides GITHUB_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Directory holding the checkouts (defaults to the current directory)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Path to fleet.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the available pipelines
    Pipelines,
    /// Run a pipeline across the fleet
    Run {
        /// Pipeline name (see `gitfleet pipelines`)
        pipeline: String,

        #[command(flatten)]
        args: RunArgs,
    },
    /// Show the sync status of every checkout
    Status {
        /// Use only local checkouts instead of listing from GitHub
        #[arg(long)]
        local: bool,

        /// Do not fetch before comparing with upstream
        #[arg(long)]
        no_fetch: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Prompt for claude-exec
    #[arg(long)]
    pub prompt: Option<String>,

    /// Mode for settings-clean
    #[arg(long)]
    pub mode: Option<String>,

    /// Condition checked before running a skill
    #[arg(long)]
    pub condition: Option<String>,

    /// Commit message for commit-push
    #[arg(short, long)]
    pub message: Option<String>,

    /// Do not fetch before comparing with upstream
    #[arg(long)]
    pub no_fetch: bool,

    /// Use only local checkouts instead of listing from GitHub
    #[arg(long)]
    pub local: bool,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default fleet.toml file
    Init,
}

fn main() {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    gitfleet::logging::init(cli.verbose);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let base_dir = match cli.base_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Pipelines => cmd::cmd_pipelines(cli.verbose),
        Commands::Run { pipeline, args } => cmd::cmd_run(cli, &base_dir, pipeline, args),
        Commands::Status { local, no_fetch } => {
            let args = RunArgs {
                local: *local,
                no_fetch: *no_fetch,
                ..Default::default()
            };
            cmd::cmd_run(cli, &base_dir, "status", &args)
        }
        Commands::Config { command } => cmd::cmd_config(cli, &base_dir, command.clone()),
    }
}
