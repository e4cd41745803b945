//! Durable cycle and per-repo history (`.heartbeat-state/state.json`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::cycle::Cycle;
use crate::core::types::HeartbeatAction;

/// Supported state schema version. Documents with any other version are discarded.
pub const STATE_VERSION: u32 = 1;

/// Bookkeeping for one repository, keyed by its stable identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoHistory {
    /// Variant applied by the last successful heartbeat.
    pub last_action: Option<HeartbeatAction>,
    /// Time of the last successful push.
    pub last_success: Option<DateTime<Utc>>,
    /// Consecutive failures; reset to 0 on success.
    pub failures: u32,
    /// Most recent failure message, present only while `failures > 0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Persisted scheduler state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    pub version: u32,
    pub cycle: Cycle,
    /// History by stable identity (origin URL or canonical path).
    #[serde(default)]
    pub repos: BTreeMap<String, RepoHistory>,
}

impl RunState {
    /// New state with a freshly shuffled cycle and no history.
    pub fn fresh<R: Rng + ?Sized>(repo_count: usize, rng: &mut R) -> Self {
        Self {
            version: STATE_VERSION,
            cycle: Cycle::shuffled(repo_count, rng),
            repos: BTreeMap::new(),
        }
    }

    pub fn history(&self, identity: &str) -> Option<&RepoHistory> {
        self.repos.get(identity)
    }

    /// Action to apply next for `identity`, toggling from its last success.
    pub fn next_action(&self, identity: &str) -> HeartbeatAction {
        HeartbeatAction::next_after(self.history(identity).and_then(|h| h.last_action))
    }

    pub fn record_success(&mut self, identity: &str, action: HeartbeatAction, at: DateTime<Utc>) {
        let entry = self.repos.entry(identity.to_string()).or_default();
        entry.last_action = Some(action);
        entry.last_success = Some(at);
        entry.failures = 0;
        entry.last_error = None;
    }

    pub fn record_failure(&mut self, identity: &str, message: impl Into<String>) {
        let entry = self.repos.entry(identity.to_string()).or_default();
        entry.failures = entry.failures.saturating_add(1);
        entry.last_error = Some(message.into());
    }
}

/// What is on disk, judged against the live repo count. Read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredState {
    /// No state file yet.
    Missing,
    /// Unsupported `version`; the whole document will be discarded.
    VersionMismatch { found: Option<u64> },
    /// History is usable but the cycle must be reshuffled.
    Drifted {
        state: RunState,
        violations: Vec<String>,
    },
    /// Resumable as-is.
    Ready(RunState),
}

/// Read and classify the state at `path` without repairing it.
///
/// Unreadable or malformed documents are errors.
pub fn inspect_state(path: &Path, repo_count: usize) -> Result<StoredState> {
    if !path.exists() {
        return Ok(StoredState::Missing);
    }

    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;

    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(STATE_VERSION)) {
        return Ok(StoredState::VersionMismatch { found: version });
    }

    let state: RunState = serde_json::from_value(value)
        .with_context(|| format!("parse state {}", path.display()))?;
    let violations = state.cycle.violations(repo_count);
    if violations.is_empty() {
        Ok(StoredState::Ready(state))
    } else {
        Ok(StoredState::Drifted { state, violations })
    }
}

/// Load state, recovering from absence and structural drift.
///
/// - missing file: fresh state
/// - unsupported `version`: fresh state (history discarded)
/// - cycle inconsistent with `repo_count`: reshuffled cycle, history kept
///
/// Unreadable or malformed documents are errors.
pub fn load_state<R: Rng + ?Sized>(path: &Path, repo_count: usize, rng: &mut R) -> Result<RunState> {
    debug!(path = %path.display(), "loading state");
    let state = match inspect_state(path, repo_count)? {
        StoredState::Missing => {
            debug!("no state file, starting fresh cycle");
            RunState::fresh(repo_count, rng)
        }
        StoredState::VersionMismatch { found } => {
            info!(
                found = ?found,
                expected = STATE_VERSION,
                "state version mismatch, resetting state"
            );
            RunState::fresh(repo_count, rng)
        }
        StoredState::Drifted {
            mut state,
            violations,
        } => {
            warn!(
                repo_count,
                violations = %violations.join("; "),
                "cycle does not match configured repos, reshuffling"
            );
            state.cycle = Cycle::shuffled(repo_count, rng);
            state
        }
        StoredState::Ready(state) => state,
    };

    debug!(
        position = state.cycle.position,
        len = state.cycle.order.len(),
        tracked = state.repos.len(),
        "state loaded"
    );
    Ok(state)
}

/// Atomically write state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &RunState) -> Result<()> {
    debug!(
        path = %path.display(),
        position = state.cycle.position,
        "writing state"
    );
    let mut buf = serde_json::to_string_pretty(state).context("serialize state")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
