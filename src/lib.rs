pub mod action;
pub mod bridge;
pub mod config;
pub mod context;
pub mod errors;
pub mod executor;
pub mod exit_codes;
pub mod filter;
pub mod github;
pub mod logging;
pub mod pipeline;
pub mod predicate;
pub mod signal;
pub mod status;
pub mod target;
pub mod ui;
pub mod vcs;
