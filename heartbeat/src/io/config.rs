//! Heartbeat configuration stored in `heartbeat.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::Method;

/// Supported config schema version.
pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_REPOS_PER_RUN: usize = 1;
pub const DEFAULT_MAX_REPOS_PER_RUN: usize = 5;

/// Heartbeat configuration (TOML).
///
/// Reloaded on every invocation and never written back by `heartbeat run`.
/// Only `version` and `repos` are required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub version: u32,

    /// Working copies to rotate through. Relative paths are resolved against the
    /// directory containing the config file.
    pub repos: Vec<PathBuf>,

    /// Repos touched per invocation (clamped on load).
    #[serde(default = "default_repos_per_run")]
    pub repos_per_run: usize,

    /// Upper bound for `repos_per_run`.
    #[serde(default = "default_max_repos_per_run")]
    pub max_repos_per_run: usize,

    #[serde(default)]
    pub method: Method,

    /// Report intended actions without touching repos or state.
    #[serde(default)]
    pub dry_run: bool,

    /// Substring patterns matched against repo path and identity.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Branch to push to instead of each repo's discovered default branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
}

fn default_repos_per_run() -> usize {
    DEFAULT_REPOS_PER_RUN
}

fn default_max_repos_per_run() -> usize {
    DEFAULT_MAX_REPOS_PER_RUN
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} (expected {})",
                self.version,
                CONFIG_VERSION
            );
        }
        if self.repos.is_empty() {
            bail!("repos must list at least one repository");
        }
        for (i, repo) in self.repos.iter().enumerate() {
            if repo.as_os_str().to_string_lossy().trim().is_empty() {
                bail!("repos[{i}] must be a non-empty path");
            }
        }
        for (i, pattern) in self.exclude.iter().enumerate() {
            if pattern.is_empty() {
                bail!("exclude[{i}] must be a non-empty pattern");
            }
        }
        if let Some(branch) = &self.target_branch
            && branch.trim().is_empty()
        {
            bail!("target_branch must not be empty when set");
        }
        Ok(())
    }

    /// Number of configured repos.
    pub fn repo_count(&self) -> usize {
        self.repos.len()
    }
}

/// Clamp a requested batch size to `[1, min(max_per_run, repo_count)]`.
pub fn clamp_repos_per_run(requested: usize, max_per_run: usize, repo_count: usize) -> usize {
    requested.min(max_per_run).min(repo_count).max(1)
}

/// Load, validate and normalize config from a TOML file.
///
/// Unlike state, a missing config is an error.
pub fn load_config(path: &Path) -> Result<HeartbeatConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config not found at {} (run `heartbeat init`)",
            path.display()
        ));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg = parse_config(&contents).with_context(|| format!("load {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(resolve_repo_paths(cfg, base))
}

/// Parse and validate config text; `repos_per_run` is clamped.
pub fn parse_config(contents: &str) -> Result<HeartbeatConfig> {
    // Check the version before typed parsing so a future schema reports a version
    // mismatch instead of an unrelated field error.
    let table: toml::Table = toml::from_str(contents).context("parse config toml")?;
    match table.get("version").and_then(toml::Value::as_integer) {
        Some(v) if v == i64::from(CONFIG_VERSION) => {}
        Some(v) => bail!("unsupported config version {v} (expected {CONFIG_VERSION})"),
        None => bail!("missing integer field `version`"),
    }

    let mut cfg: HeartbeatConfig = toml::from_str(contents).context("parse config fields")?;
    cfg.validate()?;
    let clamped = clamp_repos_per_run(cfg.repos_per_run, cfg.max_repos_per_run, cfg.repo_count());
    if clamped != cfg.repos_per_run {
        debug!(
            requested = cfg.repos_per_run,
            clamped, "repos_per_run clamped"
        );
    }
    cfg.repos_per_run = clamped;
    Ok(cfg)
}

fn resolve_repo_paths(mut cfg: HeartbeatConfig, base: &Path) -> HeartbeatConfig {
    for repo in &mut cfg.repos {
        if repo.is_relative() {
            *repo = base.join(&*repo);
        }
    }
    cfg
}
