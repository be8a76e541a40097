pub mod icons;
pub mod progress;
pub mod report;

pub use progress::FleetProgress;
pub use report::ConsoleReporter;
