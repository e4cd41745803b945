//! Deterministic, pure logic shared by the heartbeat scheduler.
//!
//! Core modules must be free of I/O side effects. Randomness is injected by the
//! caller so tests can pin a seed.

pub mod cycle;
pub mod types;
