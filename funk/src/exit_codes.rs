//! Stable exit codes for funk CLI commands.

/// Command succeeded; every analysed test passed.
pub const OK: i32 = 0;
/// Command failed due to invalid config, arguments, a failing run or other errors.
pub const ERROR: i32 = 1;
/// `funk analyse` found at least one failing test.
pub const ANALYSIS_FAILED: i32 = 2;
