//! `gitfleet pipelines`: list the registry. With `--verbose`, also the
//! shape of each pipeline.

use anyhow::Result;
use console::style;

use gitfleet::exit_codes;
use gitfleet::pipeline::{PipelineOptions, registered};

pub fn cmd_pipelines(verbose: bool) -> Result<i32> {
    let specs = registered();
    let width = specs.iter().map(|s| s.name.len()).max().unwrap_or(0);

    println!();
    println!("Available pipelines:");
    println!();
    for spec in specs {
        println!(
            "  {:<width$}  {}",
            style(spec.name).bold(),
            spec.description,
            width = width
        );
        // Pipelines that need caller input (e.g. a prompt) are listed without detail.
        if verbose && let Ok(pipeline) = (spec.build)(&PipelineOptions::default()) {
            for line in pipeline.describe().lines().skip(2) {
                println!("  {:<width$}  {}", "", line.trim(), width = width);
            }
        }
    }
    println!();
    println!("Run one with 'gitfleet run <pipeline>'.");
    println!();

    Ok(exit_codes::OK)
}
