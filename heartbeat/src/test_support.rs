//! Test-only helpers: a scripted git runner and real repositories with a bare origin.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::git::{GitOutput, GitRunner};

/// Subcommands that change a working copy or a remote.
const MUTATING_SUBCOMMANDS: [&str; 3] = ["add", "commit", "push"];

struct Scripted {
    workdir: Option<PathBuf>,
    args: Vec<String>,
    output: GitOutput,
}

/// Scripted [`GitRunner`] that records every invocation.
///
/// Unmatched commands succeed with empty output. Responses registered for a
/// specific workdir take precedence over workdir-agnostic ones.
#[derive(Default)]
pub struct FakeGit {
    scripted: Vec<Scripted>,
    calls: RefCell<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `args` in any workdir.
    pub fn respond(mut self, args: &[&str], output: GitOutput) -> Self {
        self.scripted.push(Scripted {
            workdir: None,
            args: to_strings(args),
            output,
        });
        self
    }

    /// Respond to `args` only when run inside `workdir`.
    pub fn respond_in(mut self, workdir: &Path, args: &[&str], output: GitOutput) -> Self {
        self.scripted.push(Scripted {
            workdir: Some(workdir.to_path_buf()),
            args: to_strings(args),
            output,
        });
        self
    }

    /// Successful output with the given stdout.
    pub fn ok(stdout: &str) -> GitOutput {
        GitOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn fail(code: i32, stderr: &str) -> GitOutput {
        GitOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// Every recorded invocation as `(workdir, args)`.
    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.borrow().clone()
    }

    /// Recorded invocations that would mutate a repo or remote.
    pub fn mutating_calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls()
            .into_iter()
            .filter(|(_, args)| {
                args.first()
                    .is_some_and(|sub| MUTATING_SUBCOMMANDS.contains(&sub.as_str()))
            })
            .collect()
    }
}

impl GitRunner for FakeGit {
    fn run(&self, workdir: &Path, args: &[&str]) -> Result<GitOutput> {
        let args = to_strings(args);
        self.calls
            .borrow_mut()
            .push((workdir.to_path_buf(), args.clone()));

        let specific = self
            .scripted
            .iter()
            .find(|s| s.workdir.as_deref() == Some(workdir) && s.args == args);
        let any = || {
            self.scripted
                .iter()
                .find(|s| s.workdir.is_none() && s.args == args)
        };
        Ok(specific
            .or_else(any)
            .map(|s| s.output.clone())
            .unwrap_or_else(|| FakeGit::ok("")))
    }
}

fn to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// A real working copy on `main`, pushed to a bare `origin` in the same temp dir.
pub struct TestRepo {
    _temp: TempDir,
    root: PathBuf,
    origin: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let origin = temp.path().join("origin.git");
        let root = temp.path().join("work");

        git_in(temp.path(), &["init", "--bare", "-b", "main", "origin.git"])?;
        git_in(temp.path(), &["init", "-b", "main", "work"])?;
        git_in(&root, &["config", "user.email", "test@example.com"])?;
        git_in(&root, &["config", "user.name", "test"])?;
        git_in(&root, &["config", "commit.gpgsign", "false"])?;

        fs::write(root.join("README.md"), "hi\n").context("write README.md")?;
        git_in(&root, &["add", "README.md"])?;
        git_in(&root, &["commit", "-m", "chore: init"])?;

        let origin_url = origin.to_string_lossy().to_string();
        git_in(&root, &["remote", "add", "origin", &origin_url])?;
        git_in(&root, &["push", "-u", "origin", "main"])?;
        git_in(&root, &["remote", "set-head", "origin", "main"])?;

        Ok(Self {
            _temp: temp,
            root,
            origin,
        })
    }

    /// Working copy root.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Bare origin repository.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Run git in the working copy and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git_in(&self.root, args)
    }

    /// Commit subjects on `branch` in the bare origin, newest first.
    pub fn origin_subjects(&self, branch: &str) -> Result<Vec<String>> {
        let out = git_in(&self.origin, &["log", "--pretty=%s", branch])?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

/// Run git in `dir`, failing on a non-zero exit. Returns trimmed stdout.
pub fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !out.status.success() {
        return Err(anyhow!(
            "git {} failed in {}: {}",
            args.join(" "),
            dir.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}
