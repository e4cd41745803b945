//! Stable exit codes for heartbeat CLI commands.

/// Command succeeded. Individual repo failures during `run` still exit with `OK`.
pub const OK: i32 = 0;
/// Invalid config, unreadable state, or any other fatal error.
pub const INVALID: i32 = 1;
/// Another `heartbeat run` holds the lock.
pub const LOCKED: i32 = 2;
/// `heartbeat check` found at least one repo that fails preflight.
pub const PREFLIGHT_FAILED: i32 = 3;
