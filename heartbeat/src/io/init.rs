//! `heartbeat init`: scaffold a commented config file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

/// Options for `init_config`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config.
    pub force: bool,
}

pub const CONFIG_TEMPLATE: &str = r#"# heartbeat configuration
version = 1

# Working copies to rotate through. Relative paths resolve against this file's directory.
repos = []

# Repos touched per invocation, clamped to [1, min(max_repos_per_run, len(repos))].
repos_per_run = 1
max_repos_per_run = 5

# "empty-commit" or "heartbeat-file"
method = "empty-commit"

# Report intended actions without touching repos or state.
dry_run = false

# Substring patterns matched against repo path and origin URL.
exclude = []

# Push here instead of each repo's default branch.
# target_branch = "main"
"#;

/// Write `CONFIG_TEMPLATE` to `path`.
///
/// Fails if the file already exists unless `options.force` is set.
pub fn init_config(path: &Path, options: &InitOptions) -> Result<()> {
    if path.exists() && !options.force {
        return Err(anyhow!(
            "heartbeat init: {} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, CONFIG_TEMPLATE).with_context(|| format!("write {}", path.display()))
}
