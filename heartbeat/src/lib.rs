//! Rotating git heartbeats across a fleet of working copies.
//!
//! Each invocation pushes a small, reversible commit to a few repos picked
//! from a shuffled cycle, so every repo is visited exactly once per cycle.
//! The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (cycle ordering, heartbeat variants).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, lock, git).
//!   Git is reached through a trait to enable fakes in tests.
//!
//! Orchestration modules ([`run`], [`select`], [`status`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
pub mod select;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
