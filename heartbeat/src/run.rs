//! Orchestration for a single `heartbeat run`.
//!
//! Lock, load config and state, select a batch, preflight and pulse each repo,
//! then advance the cycle and persist. The lock guard is held for the whole
//! invocation and released on every exit path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::core::types::HeartbeatAction;
use crate::io::config::load_config;
use crate::io::git::GitRunner;
use crate::io::lock::{LockAcquire, acquire_lock};
use crate::io::paths::{HeartbeatPaths, ensure_state_dir};
use crate::io::preflight::preflight;
use crate::io::pulse::{PulseOutcome, PulseRequest, send_pulse};
use crate::io::run_state::{load_state, write_state};
use crate::select::{advance_cycle, select_batch, select_or_restart};

/// Flags for `run_heartbeat`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Forces dry-run regardless of config.
    pub dry_run: bool,
}

/// What happened to one selected repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoResult {
    /// Preflight failed or could not run; nothing was attempted.
    Skipped { reasons: Vec<String> },
    Pushed { action: HeartbeatAction, branch: String },
    WouldPush { action: HeartbeatAction, plan: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoReport {
    pub index: usize,
    pub path: PathBuf,
    pub identity: Option<String>,
    pub result: RepoResult,
}

/// Result of a completed invocation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub dry_run: bool,
    pub position_before: usize,
    pub position_after: usize,
    /// True if a new cycle was started during this run.
    pub reshuffled: bool,
    pub state_written: bool,
    pub reports: Vec<RepoReport>,
}

impl RunOutcome {
    pub fn failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.result, RepoResult::Failed { .. }))
            .count()
    }
}

#[derive(Debug)]
pub enum RunStatus {
    Completed(RunOutcome),
    /// Another live process holds the lock; config and state were not read.
    Locked { holder: Option<u32> },
}

/// Run one heartbeat invocation rooted at `paths`.
///
/// Per-repo failures are recorded and reported, never returned as errors.
/// Errors are reserved for fatal conditions (config, state, lock I/O).
pub fn run_heartbeat<R: Rng + ?Sized>(
    paths: &HeartbeatPaths,
    options: &RunOptions,
    git: &dyn GitRunner,
    rng: &mut R,
) -> Result<RunStatus> {
    ensure_state_dir(&paths.state_dir)?;
    let guard = match acquire_lock(&paths.lock_path)? {
        LockAcquire::Acquired(guard) => guard,
        LockAcquire::Busy { holder } => {
            warn!(holder = ?holder, "heartbeat already running");
            return Ok(RunStatus::Locked { holder });
        }
    };

    let config = load_config(&paths.config_path)?;
    let dry_run = options.dry_run || config.dry_run;
    let mut state = load_state(&paths.state_path, config.repo_count(), rng)?;
    let position_before = state.cycle.position;

    let (batch, mut reshuffled) = if dry_run {
        (select_batch(&config, &state), false)
    } else {
        select_or_restart(&config, &mut state, rng)
    };
    info!(
        dry_run,
        selected = batch.len(),
        position = state.cycle.position,
        "batch selected"
    );

    let mut reports = Vec::with_capacity(batch.len());
    for selected in &batch {
        let repo = selected.path.as_path();
        let check = match preflight(git, repo, &config) {
            Ok(check) => check,
            Err(err) => {
                // No identity without git, so there is no history to charge.
                let error = format!("{err:#}");
                warn!(repo = %repo.display(), error = %error, "preflight errored");
                reports.push(RepoReport {
                    index: selected.index,
                    path: selected.path.clone(),
                    identity: None,
                    result: RepoResult::Skipped {
                        reasons: vec![error],
                    },
                });
                continue;
            }
        };

        let (true, Some(identity), Some(branch)) = (check.ok, check.identity.clone(), check.branch)
        else {
            info!(repo = %repo.display(), reasons = %check.errors.join("; "), "skipping repo");
            reports.push(RepoReport {
                index: selected.index,
                path: selected.path.clone(),
                identity: check.identity,
                result: RepoResult::Skipped {
                    reasons: check.errors,
                },
            });
            continue;
        };

        let action = state.next_action(&identity);
        let request = PulseRequest {
            repo,
            branch: &branch,
            action,
            method: config.method,
            dry_run,
        };
        let result = match send_pulse(git, &request) {
            Ok(PulseOutcome::DryRun { plan }) => RepoResult::WouldPush { action, plan },
            Ok(PulseOutcome::Pushed) => {
                state.record_success(&identity, action, Utc::now());
                RepoResult::Pushed {
                    action,
                    branch: branch.clone(),
                }
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(repo = %repo.display(), error = %error, "heartbeat failed");
                if !dry_run {
                    state.record_failure(&identity, error.clone());
                }
                RepoResult::Failed { error }
            }
        };
        reports.push(RepoReport {
            index: selected.index,
            path: selected.path.clone(),
            identity: Some(identity),
            result,
        });
    }

    let mut state_written = false;
    if !dry_run {
        reshuffled |= advance_cycle(&mut state, batch.len(), rng);
        write_state(&paths.state_path, &state)
            .with_context(|| format!("persist state {}", paths.state_path.display()))?;
        state_written = true;
    } else {
        debug!("dry run, state not written");
    }

    guard.release()?;
    Ok(RunStatus::Completed(RunOutcome {
        dry_run,
        position_before,
        position_after: state.cycle.position,
        reshuffled,
        state_written,
        reports,
    }))
}
