//! Git adapter for heartbeat commands.
//!
//! All version-control access goes through [`GitRunner`], so the scheduler and
//! executor can be exercised against a scripted fake. [`Git`] layers the few
//! porcelain queries and mutations the tool needs on top of a runner.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Captured result of a single git invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GitOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Capability to run a git command against a working copy.
///
/// `Err` is reserved for failing to run git at all. A non-zero exit is reported
/// through [`GitOutput::code`].
pub trait GitRunner {
    fn run(&self, workdir: &Path, args: &[&str]) -> Result<GitOutput>;
}

/// Runs the `git` binary found on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

impl GitRunner for SystemGit {
    fn run(&self, workdir: &Path, args: &[&str]) -> Result<GitOutput> {
        let output = Command::new("git")
            .args(args)
            .current_dir(workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        Ok(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Git commands bound to one working copy.
pub struct Git<'a> {
    runner: &'a dyn GitRunner,
    workdir: PathBuf,
}

impl<'a> Git<'a> {
    pub fn new(runner: &'a dyn GitRunner, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// URL of the named remote, or `None` if it is not configured.
    pub fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let out = self.run(&["remote", "get-url", remote])?;
        if !out.success() {
            return Ok(None);
        }
        let url = out.stdout.trim();
        Ok((!url.is_empty()).then(|| url.to_string()))
    }

    /// Branch the remote's `HEAD` points at (`refs/remotes/<remote>/HEAD`).
    pub fn remote_head(&self, remote: &str) -> Result<Option<String>> {
        let reference = format!("refs/remotes/{remote}/HEAD");
        let out = self.run(&["symbolic-ref", "--quiet", "--short", &reference])?;
        if !out.success() {
            return Ok(None);
        }
        let short = out.stdout.trim();
        let prefix = format!("{remote}/");
        let branch = short.strip_prefix(&prefix).unwrap_or(short);
        Ok((!branch.is_empty()).then(|| branch.to_string()))
    }

    /// Return the checked-out branch, or `None` on a detached HEAD.
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if !out.success() {
            warn!(workdir = %self.workdir.display(), "detached HEAD detected");
            return Ok(None);
        }
        let name = out.stdout.trim().to_string();
        debug!(branch = %name, "current branch");
        Ok((!name.is_empty()).then_some(name))
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// True if the worktree has no staged, unstaged or untracked changes.
    #[instrument(skip_all)]
    pub fn is_clean(&self) -> Result<bool> {
        let entries = self.status_porcelain()?;
        if !entries.is_empty() {
            debug!(changed = entries.len(), "worktree not clean");
        }
        Ok(entries.is_empty())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let out = self.run(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])?;
        Ok(out.success())
    }

    /// Stage a single path.
    pub fn add_path(&self, path: &str) -> Result<()> {
        self.run_checked(&["add", "--", path])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run_capture(&["diff", "--cached", "--name-only"])?;
        Ok(!out.trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Create a commit with no content changes.
    #[instrument(skip_all)]
    pub fn commit_empty(&self, message: &str) -> Result<()> {
        debug!("creating empty commit");
        self.run_checked(&["commit", "--allow-empty", "-m", message])?;
        Ok(())
    }

    /// Push `HEAD` to `branch` on `remote`.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn push_head(&self, remote: &str, branch: &str) -> Result<()> {
        debug!(remote, branch, "pushing");
        let refspec = format!("HEAD:refs/heads/{branch}");
        self.run_checked(&["push", remote, &refspec])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        Ok(self.run_checked(args)?.stdout)
    }

    fn run_checked(&self, args: &[&str]) -> Result<GitOutput> {
        let output = self.run(args)?;
        if !output.success() {
            let code = output
                .code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(anyhow!(
                "git {} failed (exit {}): {}",
                args.join(" "),
                code,
                output.stderr.trim()
            ));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<GitOutput> {
        self.runner.run(&self.workdir, args)
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
