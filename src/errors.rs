//! Typed error hierarchy for gitfleet.
//!
//! Per-target failures never surface here: they become `Outcome::Failed`.
//! These errors cover the process-level concerns around a batch:
//! - `FleetError`: configuration, target listing and CLI-level refusals
//! - `BridgeError`: failures of the isolated async runtime itself
//! - `ToolError`: an external command that could not be run to completion

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that abort an invocation before or around a batch.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Base directory {path} is inside a git repository; run gitfleet from a plain directory")]
    InsideGitRepository { path: PathBuf },

    #[error("Unknown pipeline '{name}' (run `gitfleet pipelines` to list them)")]
    UnknownPipeline { name: String },

    #[error("Pipeline '{pipeline}' needs {flag}")]
    MissingArgument { pipeline: String, flag: String },

    #[error("Pipeline '{pipeline}' requires a GitHub token (set GITHUB_TOKEN or pass --token)")]
    TokenRequired { pipeline: String },

    #[error("No GitHub username configured (set GITHUB_USERNAME or pass --username)")]
    UsernameRequired,

    #[error("--private-only and --public-only are mutually exclusive")]
    ConflictingVisibility,

    #[error("Invalid repository pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("GitHub API error: {0}")]
    GitHub(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from running a future on a throwaway runtime.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Timed out after {elapsed:?} (limit {limit:?})")]
    TimedOut { elapsed: Duration, limit: Duration },
}

/// Failure to run an external tool. A tool that ran and exited non-zero is
/// not an error at this level.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{program} not found on PATH")]
    NotFound { program: String },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_read_carries_path_and_source() {
        let path = PathBuf::from("/fleet/fleet.toml");
        let err = FleetError::ConfigRead {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        match &err {
            FleetError::ConfigRead { path: p, source } => {
                assert_eq!(p, &path);
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected ConfigRead"),
        }
        assert!(err.to_string().contains("/fleet/fleet.toml"));
    }

    #[test]
    fn unknown_pipeline_names_the_pipeline() {
        let err = FleetError::UnknownPipeline {
            name: "frobnicate".into(),
        };
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn bridge_error_converts_into_fleet_error() {
        let inner = BridgeError::TimedOut {
            elapsed: Duration::from_secs(3),
            limit: Duration::from_secs(2),
        };
        let err: FleetError = inner.into();
        assert!(matches!(
            err,
            FleetError::Bridge(BridgeError::TimedOut { .. })
        ));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&FleetError::ConflictingVisibility);
        assert_std_error(&BridgeError::Runtime(std::io::Error::other("x")));
        assert_std_error(&ToolError::NotFound {
            program: "gh".into(),
        });
    }
}
