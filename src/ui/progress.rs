use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::context::OutcomeStatus;
use crate::executor::Tally;
use crate::ui::icons::{CHECK, CROSS, SKIP};

/// Single progress bar for pipelines that report by count rather than by
/// line, with a live `✓ n ⊘ n ✗ n` tally as its message.
pub struct FleetProgress {
    bar: ProgressBar,
    tally: Tally,
}

impl FleetProgress {
    /// Create the bar.
    ///
    /// # Arguments
    /// * `total`: number of targets that will be dispatched
    /// * `label`: pipeline name shown as the bar prefix
    pub fn new(total: u64, label: &str) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let bar = ProgressBar::new(total);
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        let progress = Self {
            bar,
            tally: Tally::default(),
        };
        progress.refresh();
        progress
    }

    /// Count one finished target and advance the bar.
    pub fn record(&mut self, status: OutcomeStatus) {
        self.tally.add(status);
        self.bar.inc(1);
        self.refresh();
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    /// Print above the bar, falling back to stderr if the bar is hidden.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.bar.is_hidden() {
            eprintln!("{}", msg.as_ref());
        } else {
            self.bar.println(msg.as_ref());
        }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    fn refresh(&self) {
        self.bar.set_message(format!(
            "{} {}  {} {}  {} {}",
            style(CHECK).green(),
            self.tally.success,
            style(SKIP).yellow(),
            self.tally.skipped,
            style(CROSS).red(),
            self.tally.failed
        ));
    }
}
