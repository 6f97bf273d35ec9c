//! Stable exit codes for the cmdlink binary.

/// The invocation ran. Command-level failures are reported as replies and
/// still exit with `OK`.
pub const OK: i32 = 0;
/// Startup failed: unreadable data directory, invalid config or corrupt store.
pub const INVALID: i32 = 1;
