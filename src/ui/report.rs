//! Console rendering of a batch: the plan, one line per finished target (or
//! a progress bar), the summary and the status distribution.

use console::style;

use crate::context::{Outcome, OutcomeStatus, RunFlags};
use crate::executor::{BatchObserver, BatchPlan, BatchReport, BatchStatus, TargetOutcome};
use crate::pipeline::Pipeline;
use crate::status::StatusTally;
use crate::ui::icons::{BULLET, CHECK, CROSS, FLEET, PREVIEW, SKIP, STATUS};
use crate::ui::progress::FleetProgress;

const RULE_WIDTH: usize = 60;

/// Categories with at most this many members are always listed in full.
const LIST_LIMIT: usize = 10;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn marker(status: OutcomeStatus) -> String {
    match status {
        OutcomeStatus::Success => style(CHECK).green().to_string(),
        OutcomeStatus::Skipped => style(SKIP).yellow().to_string(),
        OutcomeStatus::Failed => style(CROSS).red().to_string(),
    }
}

/// The pre-dispatch plan.
pub fn render_plan(pipeline: &Pipeline, plan: &BatchPlan, flags: RunFlags) -> String {
    let mut out = Vec::new();
    out.push(String::new());
    out.push(rule());
    out.push(format!("{}Pipeline: {}", FLEET, style(pipeline.name()).bold()));
    out.push(textwrap::fill(
        &format!("Description: {}", pipeline.description()),
        textwrap::Options::new(RULE_WIDTH).subsequent_indent("  "),
    ));
    out.push(rule());

    out.push(String::new());
    out.push(format!("Repositories to process ({}):", plan.to_run.len()));
    for ctx in &plan.to_run {
        out.push(format!("  {} {}", BULLET, ctx.target.full_name));
    }

    if !plan.skipped.is_empty() {
        out.push(String::new());
        out.push(format!("Repositories to skip ({}):", plan.skipped.len()));
        for skipped in &plan.skipped {
            out.push(format!(
                "  {} {}: {}",
                style(SKIP).yellow(),
                skipped.target.full_name,
                style(&skipped.reason).dim()
            ));
        }
    }

    out.push(String::new());
    if flags.preview_only {
        out.push(format!("{}Dry run: nothing will be changed", PREVIEW));
    } else {
        out.push("Dry run: false".to_string());
    }
    if flags.ignore_guards {
        out.push("Guards ignored (--force)".to_string());
    }
    out.push(rule());
    out.join("\n")
}

/// One line for a finished target.
pub fn render_result(result: &TargetOutcome) -> String {
    format!(
        "{} {}: {}",
        marker(result.outcome.status()),
        result.target.name,
        result.outcome.message()
    )
}

fn render_step(step: &Outcome) -> String {
    format!(
        "    {} {}{}",
        marker(step.status()),
        step.action().map(|a| format!("[{}] ", a)).unwrap_or_default(),
        style(step.message()).dim()
    )
}

/// Final counts, and the failures again when they were hidden behind a
/// progress bar.
pub fn render_summary(report: &BatchReport, list_failures: bool) -> String {
    let tally = report.tally();
    let mut out = vec![
        String::new(),
        format!(
            "Summary: {} {} succeeded  {} {} skipped  {} {} failed",
            style(CHECK).green(),
            tally.success,
            style(SKIP).yellow(),
            tally.skipped,
            style(CROSS).red(),
            tally.failed
        ),
    ];
    if !report.skipped.is_empty() {
        out.push(format!(
            "{} not dispatched (guards not met)",
            report.skipped.len()
        ));
    }
    if list_failures && tally.failed > 0 {
        out.push(String::new());
        out.push(style("Failures:").red().bold().to_string());
        for r in report.outcomes.iter().filter(|r| r.outcome.is_failed()) {
            out.push(format!("  {} {}: {}", style(CROSS).red(), r.target.full_name, r.outcome.message()));
        }
    }
    if report.status == BatchStatus::Cancelled {
        out.push(
            style("Cancelled: remaining repositories were not processed")
                .yellow()
                .to_string(),
        );
    }
    out.join("\n")
}

/// The STATUS DISTRIBUTION block, or `None` when nothing was classified.
pub fn render_status_distribution(tally: &StatusTally) -> Option<String> {
    let groups = tally.by_category();
    if groups.is_empty() {
        return None;
    }

    let mut out = vec![
        String::new(),
        rule(),
        format!("{}STATUS DISTRIBUTION", STATUS),
        rule(),
    ];
    for (label, members) in groups {
        let count = members.len();
        out.push(String::new());
        out.push(format!(
            "{}: {} {}",
            style(label).bold(),
            count,
            if count == 1 { "repository" } else { "repositories" }
        ));
        let actionable = members.first().is_some_and(|(_, s)| s.needs_attention());
        if actionable || count <= LIST_LIMIT {
            for (repo, state) in &members {
                match state.counts() {
                    Some(counts) => out.push(format!("  - {} ({})", repo, counts)),
                    None => out.push(format!("  - {}", repo)),
                }
            }
        }
    }
    out.push(rule());
    Some(out.join("\n"))
}

pub fn print_status_distribution(tally: &StatusTally) {
    if let Some(text) = render_status_distribution(tally) {
        println!("{}", text);
    }
}

/// [`BatchObserver`] that writes to the terminal.
///
/// Pipelines marked progress-only get a [`FleetProgress`] bar; everything
/// else prints one line per target as it completes.
pub struct ConsoleReporter {
    verbose: bool,
    progress: Option<FleetProgress>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            progress: None,
        }
    }
}

impl BatchObserver for ConsoleReporter {
    fn plan(&mut self, pipeline: &Pipeline, plan: &BatchPlan, flags: RunFlags) {
        println!("{}", render_plan(pipeline, plan, flags));
        if plan.is_empty() {
            println!("\nNo repositories to process.");
        }
    }

    fn declined(&mut self) {
        println!("Operation cancelled.");
    }

    fn started(&mut self, pipeline: &Pipeline, total: usize, _workers: usize) {
        if pipeline.hints().progress_only {
            self.progress = Some(FleetProgress::new(total as u64, pipeline.name()));
        }
    }

    fn completed(&mut self, result: &TargetOutcome) {
        match &mut self.progress {
            Some(progress) => {
                progress.record(result.outcome.status());
                if self.verbose {
                    progress.println(render_result(result));
                }
            }
            None => {
                println!("{}", render_result(result));
                if self.verbose && result.steps.len() > 1 {
                    for step in &result.steps {
                        println!("{}", render_step(step));
                    }
                }
            }
        }
    }

    fn finished(&mut self, report: &BatchReport) {
        let list_failures = self.progress.is_some();
        if let Some(progress) = self.progress.take() {
            progress.finish();
        }
        println!("{}", render_summary(report, list_failures));
    }
}
