//! Read-only views: `heartbeat status` and `heartbeat check`.
//!
//! Neither takes the lock or writes anything.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::core::types::Method;
use crate::io::config::load_config;
use crate::io::git::GitRunner;
use crate::io::lock::{LockOwner, read_owner};
use crate::io::paths::HeartbeatPaths;
use crate::io::preflight::{PreflightReport, preflight};
use crate::io::run_state::{RepoHistory, StoredState, inspect_state};
use crate::select::{SelectedRepo, select_batch};

/// Snapshot of config and persisted state.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub repos: Vec<PathBuf>,
    pub repos_per_run: usize,
    pub method: Method,
    pub dry_run: bool,
    pub position: usize,
    pub cycle_len: usize,
    /// Why the next run will start a new cycle, if it will.
    pub reset: Option<String>,
    /// Repos the next run would pick. Empty when a reset is pending.
    pub next_batch: Vec<SelectedRepo>,
    pub history: BTreeMap<String, RepoHistory>,
    /// Recorded lock owner, live or stale.
    pub lock: Option<LockOwner>,
}

/// Build a [`StatusReport`] for `paths`.
pub fn collect_status(paths: &HeartbeatPaths) -> Result<StatusReport> {
    let config = load_config(&paths.config_path)?;
    debug!(state = %paths.state_path.display(), "collecting status");
    let stored = inspect_state(&paths.state_path, config.repo_count())?;

    let (state, reset) = match stored {
        StoredState::Missing => (None, Some("no state yet, first run shuffles".to_string())),
        StoredState::VersionMismatch { found } => (
            None,
            Some(format!(
                "state version {} unsupported, history will be discarded",
                found.map_or_else(|| "missing".to_string(), |v| v.to_string())
            )),
        ),
        StoredState::Drifted { state, violations } => (
            Some(state),
            Some(format!("cycle will be reshuffled: {}", violations.join("; "))),
        ),
        StoredState::Ready(state) => {
            let reset = state
                .cycle
                .is_exhausted()
                .then(|| "cycle exhausted, next run reshuffles".to_string());
            (Some(state), reset)
        }
    };

    let next_batch = match (&state, &reset) {
        (Some(state), None) => select_batch(&config, state),
        _ => Vec::new(),
    };
    let (position, cycle_len, history) = match state {
        Some(state) => (state.cycle.position, state.cycle.order.len(), state.repos),
        None => (0, config.repo_count(), BTreeMap::new()),
    };

    Ok(StatusReport {
        config_path: paths.config_path.clone(),
        state_path: paths.state_path.clone(),
        repos_per_run: config.repos_per_run,
        method: config.method,
        dry_run: config.dry_run,
        repos: config.repos,
        position,
        cycle_len,
        reset,
        next_batch,
        history,
        lock: read_owner(&paths.lock_path)?,
    })
}

/// Preflight result for one configured repo.
#[derive(Debug, Clone)]
pub struct CheckEntry {
    pub path: PathBuf,
    pub report: PreflightReport,
}

/// Preflight every configured repo, in config order.
///
/// A git invocation that cannot even be spawned is reported as a failure for
/// that repo rather than aborting the check.
pub fn check_repos(paths: &HeartbeatPaths, git: &dyn GitRunner) -> Result<Vec<CheckEntry>> {
    let config = load_config(&paths.config_path)?;
    let entries = config
        .repos
        .iter()
        .map(|path| {
            let report = preflight(git, path, &config).unwrap_or_else(|err| PreflightReport {
                ok: false,
                errors: vec![format!("{err:#}")],
                branch: None,
                identity: None,
            });
            CheckEntry {
                path: path.clone(),
                report,
            }
        })
        .collect();
    Ok(entries)
}
