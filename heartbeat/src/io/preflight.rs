//! Read-only checks run against a working copy before any heartbeat.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::config::HeartbeatConfig;
use crate::io::git::{Git, GitRunner};

/// Remote every heartbeat is pushed to.
pub const REMOTE: &str = "origin";

/// Outcome of [`preflight`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    /// True when `errors` is empty.
    pub ok: bool,
    /// Every failed check, in check order.
    pub errors: Vec<String>,
    /// Resolved target branch (config override or discovered default).
    pub branch: Option<String>,
    /// Stable identity, when the path is a git working copy.
    pub identity: Option<String>,
}

impl PreflightReport {
    fn short_circuit(error: String) -> Self {
        Self {
            ok: false,
            errors: vec![error],
            branch: None,
            identity: None,
        }
    }
}

/// Stable identity of a repo: the origin URL, or its canonical path.
///
/// Changing the origin URL changes the identity, which starts a new history.
pub fn identify(git: &Git<'_>) -> Result<String> {
    if let Some(url) = git.remote_url(REMOTE)? {
        return Ok(url);
    }
    let canonical = fs::canonicalize(git.workdir())
        .with_context(|| format!("canonicalize {}", git.workdir().display()))?;
    Ok(canonical.to_string_lossy().to_string())
}

/// Discover the branch heartbeats should land on.
///
/// First match wins: origin's `HEAD`, local `main`, local `master`, the
/// checked-out branch.
pub fn default_branch(git: &Git<'_>) -> Result<Option<String>> {
    if let Some(branch) = git.remote_head(REMOTE)? {
        return Ok(Some(branch));
    }
    for candidate in ["main", "master"] {
        if git.branch_exists(candidate)? {
            return Ok(Some(candidate.to_string()));
        }
    }
    git.current_branch()
}

/// True if `pattern` occurs in the repo's identity or path.
pub fn matches_exclusion(pattern: &str, identity: &str, path: &str) -> bool {
    identity.contains(pattern) || path.contains(pattern)
}

/// Check that `repo` can receive a heartbeat.
///
/// A missing path or missing `.git` short-circuits. All other checks run and
/// every failure is reported.
#[instrument(skip_all, fields(repo = %repo.display()))]
pub fn preflight(
    runner: &dyn GitRunner,
    repo: &Path,
    config: &HeartbeatConfig,
) -> Result<PreflightReport> {
    if !repo.exists() {
        return Ok(PreflightReport::short_circuit(format!(
            "path does not exist: {}",
            repo.display()
        )));
    }
    if !repo.join(".git").exists() {
        return Ok(PreflightReport::short_circuit(format!(
            "not a git working copy (no .git): {}",
            repo.display()
        )));
    }

    let git = Git::new(runner, repo);
    let mut errors = Vec::new();

    if git.remote_url(REMOTE)?.is_none() {
        errors.push(format!("no '{REMOTE}' remote configured"));
    }

    if !git.is_clean()? {
        errors.push("working tree has uncommitted changes".to_string());
    }

    let branch = match &config.target_branch {
        Some(branch) => Some(branch.clone()),
        None => default_branch(&git)?,
    };
    match (git.current_branch()?, &branch) {
        (None, _) => errors.push("detached or unknown branch".to_string()),
        (Some(_), None) => errors.push("unable to resolve target branch".to_string()),
        (Some(current), Some(target)) if &current != target => {
            errors.push(format!("on branch '{current}', expected '{target}'"));
        }
        (Some(_), Some(_)) => {}
    }

    let identity = identify(&git)?;
    let path = repo.to_string_lossy();
    for pattern in &config.exclude {
        if matches_exclusion(pattern, &identity, &path) {
            errors.push(format!("excluded by pattern '{pattern}'"));
        }
    }

    debug!(errors = errors.len(), branch = ?branch, "preflight finished");
    Ok(PreflightReport {
        ok: errors.is_empty(),
        errors,
        branch,
        identity: Some(identity),
    })
}
