//! Shared deterministic types for heartbeat core logic.
//!
//! These types define stable contracts between the scheduler, the state store and
//! the executor. They must not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Heartbeat variant applied to a repository.
///
/// Each repo toggles between the two variants on every successful run:
/// `none -> Pulse -> Beat -> Pulse -> ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatAction {
    Pulse,
    Beat,
}

impl HeartbeatAction {
    /// Variant used for a repo without history.
    pub const DEFAULT: Self = Self::Pulse;

    /// The other variant.
    pub fn successor(self) -> Self {
        match self {
            Self::Pulse => Self::Beat,
            Self::Beat => Self::Pulse,
        }
    }

    /// Next variant given the last recorded one.
    pub fn next_after(last: Option<Self>) -> Self {
        last.map_or(Self::DEFAULT, Self::successor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pulse => "pulse",
            Self::Beat => "beat",
        }
    }

    pub fn commit_message(self) -> &'static str {
        match self {
            Self::Pulse => "chore(heartbeat): pulse",
            Self::Beat => "chore(heartbeat): beat",
        }
    }

    /// Contents of the marker file for the `heartbeat-file` method.
    pub fn marker_contents(self) -> &'static str {
        match self {
            Self::Pulse => "pulse\n",
            Self::Beat => "beat\n",
        }
    }
}

impl fmt::Display for HeartbeatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation strategy used to produce a heartbeat commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// `git commit --allow-empty`.
    #[default]
    EmptyCommit,
    /// Toggle a marker file under `.heartbeat/` and commit it.
    HeartbeatFile,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCommit => f.write_str("empty-commit"),
            Self::HeartbeatFile => f.write_str("heartbeat-file"),
        }
    }
}
