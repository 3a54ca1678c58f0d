//! Process exit codes. Part of the CLI contract.

pub const EXIT_SUCCESS: i32 = 0;
/// Requested record absent, or nothing to evaluate.
pub const EXIT_NOT_FOUND: i32 = 1;
/// Configuration, store or other fatal error.
pub const EXIT_CONFIG_ERROR: i32 = 2;
