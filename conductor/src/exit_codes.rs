//! Stable exit codes for conductor CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed (config, store, git, or backend error).
pub const FAILURE: i32 = 1;
/// Command was interrupted (explicit interruption or an
/// interruption-shaped failure message).
pub const INTERRUPTED: i32 = 130;
