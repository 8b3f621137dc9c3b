//! Stable exit codes for the `submit` CLI.

/// Every instance was started or submitted (and, with `--wait`, exited with 0).
pub const OK: i32 = 0;
/// At least one instance failed.
pub const FAILED: i32 = 1;
/// Invalid invocation or configuration; nothing was dispatched.
pub const INVALID: i32 = 2;
