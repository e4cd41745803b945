//! Canonical file locations for a heartbeat home directory.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Config file name inside the heartbeat root.
pub const CONFIG_FILE: &str = "heartbeat.toml";
/// Directory holding state and lock inside the heartbeat root.
///
/// Distinct from the `.heartbeat/` marker directory so a root that is itself a
/// managed working copy never sees its own state as uncommitted changes.
pub const STATE_DIR: &str = ".heartbeat-state";
/// Ignore-everything file written into [`STATE_DIR`].
const STATE_GITIGNORE: &str = "*\n";

/// All canonical paths for a heartbeat root.
#[derive(Debug, Clone)]
pub struct HeartbeatPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
    pub state_path: PathBuf,
    pub lock_path: PathBuf,
}

impl HeartbeatPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR);
        Self {
            root: root.clone(),
            config_path: root.join(CONFIG_FILE),
            state_path: state_dir.join("state.json"),
            lock_path: state_dir.join("heartbeat.lock"),
            state_dir,
        }
    }

    /// Use `config_path` instead of `<root>/heartbeat.toml`.
    pub fn with_config(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.config_path = config_path.into();
        self
    }
}

/// Create `state_dir` with a `.gitignore` that hides its contents from git.
///
/// An existing `.gitignore` is left alone.
pub fn ensure_state_dir(state_dir: &Path) -> Result<()> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("create state dir {}", state_dir.display()))?;
    let ignore = state_dir.join(".gitignore");
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&ignore)
    {
        Ok(mut file) => file
            .write_all(STATE_GITIGNORE.as_bytes())
            .with_context(|| format!("write {}", ignore.display())),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err).with_context(|| format!("create {}", ignore.display())),
    }
}
