//! Heartbeat executor: commit a toggled heartbeat and push it to origin.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::types::{HeartbeatAction, Method};
use crate::io::git::{Git, GitRunner};
use crate::io::preflight::REMOTE;

/// Marker directory created inside a repo by the `heartbeat-file` method.
pub const MARKER_DIR: &str = ".heartbeat";
/// Marker file, relative to the repo root.
pub const MARKER_FILE: &str = ".heartbeat/heartbeat.txt";

/// One heartbeat to apply.
#[derive(Debug, Clone)]
pub struct PulseRequest<'a> {
    pub repo: &'a Path,
    pub branch: &'a str,
    pub action: HeartbeatAction,
    pub method: Method,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulseOutcome {
    /// Commit created and pushed.
    Pushed,
    /// Dry run; nothing was touched.
    DryRun { plan: String },
}

/// Apply the heartbeat described by `request`.
///
/// Push rejections and other git failures are returned as errors; callers
/// record them per repo and carry on.
#[instrument(skip_all, fields(repo = %request.repo.display(), action = %request.action))]
pub fn send_pulse(runner: &dyn GitRunner, request: &PulseRequest<'_>) -> Result<PulseOutcome> {
    if request.dry_run {
        let plan = describe(request);
        info!(plan = %plan, "dry run");
        return Ok(PulseOutcome::DryRun { plan });
    }

    let git = Git::new(runner, request.repo);
    let message = request.action.commit_message();
    match request.method {
        Method::EmptyCommit => git.commit_empty(message)?,
        Method::HeartbeatFile => commit_marker(&git, request.repo, request.action)?,
    }
    git.push_head(REMOTE, request.branch)?;
    info!(branch = request.branch, "heartbeat pushed");
    Ok(PulseOutcome::Pushed)
}

fn commit_marker(git: &Git<'_>, repo: &Path, action: HeartbeatAction) -> Result<()> {
    let dir = repo.join(MARKER_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = repo.join(MARKER_FILE);
    fs::write(&path, action.marker_contents())
        .with_context(|| format!("write {}", path.display()))?;
    git.add_path(MARKER_FILE)?;

    let message = action.commit_message();
    if !git.commit_staged(message)? {
        // Marker already held this variant (history lost or edited by hand).
        debug!("marker unchanged, falling back to empty commit");
        git.commit_empty(message)?;
    }
    Ok(())
}

/// Human-readable description of what `request` would do.
pub fn describe(request: &PulseRequest<'_>) -> String {
    let change = match request.method {
        Method::EmptyCommit => "empty commit".to_string(),
        Method::HeartbeatFile => format!("write {MARKER_FILE} ({})", request.action),
    };
    format!(
        "would {change} '{}' and push to {REMOTE}/{}",
        request.action.commit_message(),
        request.branch
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeGit, TestRepo};

    fn request<'a>(repo: &'a Path, method: Method, dry_run: bool) -> PulseRequest<'a> {
        PulseRequest {
            repo,
            branch: "main",
            action: HeartbeatAction::Pulse,
            method,
            dry_run,
        }
    }

    #[test]
    fn dry_run_issues_no_git_commands() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fake = FakeGit::new();
        for method in [Method::EmptyCommit, Method::HeartbeatFile] {
            let outcome = send_pulse(&fake, &request(temp.path(), method, true)).expect("pulse");
            let PulseOutcome::DryRun { plan } = outcome else {
                panic!("expected dry run outcome");
            };
            assert!(plan.starts_with("would "));
            assert!(plan.contains("origin/main"));
        }
        assert!(fake.calls().is_empty());
        assert!(!temp.path().join(MARKER_DIR).exists());
    }

    #[test]
    fn empty_commit_commits_then_pushes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fake = FakeGit::new();
        let outcome =
            send_pulse(&fake, &request(temp.path(), Method::EmptyCommit, false)).expect("pulse");
        assert_eq!(outcome, PulseOutcome::Pushed);

        let calls: Vec<Vec<String>> = fake.calls().into_iter().map(|(_, args)| args).collect();
        assert_eq!(
            calls,
            vec![
                vec!["commit", "--allow-empty", "-m", "chore(heartbeat): pulse"],
                vec!["push", "origin", "HEAD:refs/heads/main"],
            ]
        );
    }

    #[test]
    fn push_rejection_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fake = FakeGit::new().respond(
            &["push", "origin", "HEAD:refs/heads/main"],
            FakeGit::fail(1, "! [rejected] main -> main (non-fast-forward)"),
        );
        let err = send_pulse(&fake, &request(temp.path(), Method::EmptyCommit, false))
            .expect_err("push should fail");
        assert!(err.to_string().contains("non-fast-forward"));
    }

    /// Exercises the marker strategy against a real repo and bare origin.
    #[test]
    fn heartbeat_file_toggles_marker_and_pushes() {
        let repo = TestRepo::new().expect("repo");
        let mut req = request(repo.path(), Method::HeartbeatFile, false);

        send_pulse(&crate::io::git::SystemGit, &req).expect("pulse");
        let marker = fs::read_to_string(repo.path().join(MARKER_FILE)).expect("read marker");
        assert_eq!(marker, "pulse\n");

        req.action = HeartbeatAction::Beat;
        send_pulse(&crate::io::git::SystemGit, &req).expect("beat");
        let marker = fs::read_to_string(repo.path().join(MARKER_FILE)).expect("read marker");
        assert_eq!(marker, "beat\n");

        let subjects = repo.origin_subjects("main").expect("origin log");
        assert_eq!(subjects[0], "chore(heartbeat): beat");
        assert_eq!(subjects[1], "chore(heartbeat): pulse");
        assert_eq!(repo.git(&["status", "--porcelain"]).expect("status"), "");
    }

    #[test]
    fn unchanged_marker_falls_back_to_empty_commit() {
        let repo = TestRepo::new().expect("repo");
        let req = request(repo.path(), Method::HeartbeatFile, false);
        send_pulse(&crate::io::git::SystemGit, &req).expect("first");
        send_pulse(&crate::io::git::SystemGit, &req).expect("second");

        let subjects = repo.origin_subjects("main").expect("origin log");
        assert_eq!(subjects[0], "chore(heartbeat): pulse");
        assert_eq!(subjects[1], "chore(heartbeat): pulse");
    }
}
