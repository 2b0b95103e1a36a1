//! Stable exit codes for `runner-fleet` commands.

/// Command succeeded; every runner action (if any) exited zero.
pub const OK: i32 = 0;
/// Invalid config or declaration, or a pass aborted before finishing.
pub const INVALID: i32 = 1;
/// The pass finished but at least one runner action failed.
pub const ACTION_FAILED: i32 = 2;
