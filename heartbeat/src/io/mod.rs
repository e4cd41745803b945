//! I/O adapters for heartbeat commands.

pub mod config;
pub mod git;
pub mod init;
pub mod lock;
pub mod paths;
pub mod preflight;
pub mod pulse;
pub mod run_state;
