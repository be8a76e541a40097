//! Stable process exit codes.

/// Every dispatched target finished without a failed outcome, or the
/// operator declined the confirmation prompt.
pub const OK: i32 = 0;
/// At least one target failed, or the invocation errored before dispatch.
pub const FAILED: i32 = 1;
/// The operator interrupted the batch (128 + SIGINT).
pub const CANCELLED: i32 = 130;
