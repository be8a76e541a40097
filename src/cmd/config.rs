//! Configuration view and validation commands: `gitfleet config`.

use anyhow::Result;
use std::path::Path;

use gitfleet::config::{CONFIG_FILE_NAME, CliOverrides, FleetConfig, FleetToml, locate};
use gitfleet::exit_codes;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, base_dir: &Path, command: Option<ConfigCommands>) -> Result<i32> {
    let found = locate(base_dir, cli.config.as_deref());

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Fleet Configuration");
            println!("===================");
            println!();

            match &found {
                Some(path) => {
                    println!("Config file: {}", path.display());
                    println!();
                    print_toml(&FleetToml::load(path)?);
                }
                None => {
                    println!("No {} found; using defaults.", CONFIG_FILE_NAME);
                    println!();
                    print_toml(&FleetToml::default());
                    println!("Run 'gitfleet config init' to create one.");
                    println!();
                }
            }

            let config = FleetConfig::resolve(
                base_dir.to_path_buf(),
                &CliOverrides {
                    config: cli.config.clone(),
                    username: cli.username.clone(),
                    token: cli.token.clone(),
                    workers: cli.workers,
                    sequential: cli.sequential,
                    include_forks: cli.include_forks,
                    include_archived: cli.include_archived,
                },
            )?;
            println!("Effective values (with env/CLI overrides):");
            println!("  base_dir = \"{}\"", config.base_dir.display());
            println!(
                "  username = {}",
                config.username.as_deref().map_or("(unset)".into(), |u| format!("\"{}\"", u))
            );
            println!(
                "  token = {}",
                if config.token.is_some() { "(set)" } else { "(unset)" }
            );
            println!("  claude_cmd = \"{}\"", config.claude_cmd);
            println!(
                "  workers = {}",
                config.workers.map_or("auto".into(), |w| w.to_string())
            );
            println!("  sequential = {}", config.sequential);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let Some(path) = found else {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(exit_codes::OK);
            };

            let warnings = FleetToml::load(&path)?.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| base_dir.join(CONFIG_FILE_NAME));
            if path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(exit_codes::OK);
            }

            FleetToml::default().save(&path)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, path.display());
            println!();
            println!("You can now customize:");
            println!("  - [github] username, orgs");
            println!("  - [defaults] workers, sequential, fetch, claude_cmd");
            println!("  - [timeouts] clone, pull, fetch, push, subprocess, claude");
            println!();
        }
    }

    Ok(exit_codes::OK)
}

fn print_toml(toml: &FleetToml) {
    println!("[github]");
    if let Some(username) = &toml.github.username {
        println!("  username = \"{}\"", username);
    }
    if !toml.github.orgs.is_empty() {
        println!("  orgs = {:?}", toml.github.orgs);
    }
    println!();

    println!("[defaults]");
    if let Some(workers) = toml.defaults.workers {
        println!("  workers = {}", workers);
    }
    println!("  sequential = {}", toml.defaults.sequential);
    println!("  fetch = {}", toml.defaults.fetch);
    if let Some(cmd) = &toml.defaults.claude_cmd {
        println!("  claude_cmd = \"{}\"", cmd);
    }
    println!();

    let t = &toml.timeouts;
    println!("[timeouts]");
    println!("  clone = {}", t.clone);
    println!("  pull = {}", t.pull);
    println!("  fetch = {}", t.fetch);
    println!("  push = {}", t.push);
    println!("  subprocess = {}", t.subprocess);
    println!("  claude = {}", t.claude);
    println!();

    println!("[filter]");
    println!("  include_forks = {}", toml.filter.include_forks);
    println!("  include_archived = {}", toml.filter.include_archived);
    println!();
}
