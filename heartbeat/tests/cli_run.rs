//! CLI tests for `heartbeat` subcommands.
//!
//! Spawns the binary and verifies exit codes and the files it leaves behind.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use heartbeat::exit_codes;
use heartbeat::io::paths::HeartbeatPaths;
use heartbeat::test_support::TestRepo;

fn run_cli(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_heartbeat"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("spawn heartbeat")
}

fn write_config(paths: &HeartbeatPaths, repo: &Path, extra: &str) {
    fs::write(
        &paths.config_path,
        format!(
            "version = 1\nrepos = [{:?}]\n{extra}",
            repo.to_string_lossy()
        ),
    )
    .expect("write config");
}

#[test]
fn run_with_live_lock_exits_locked() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(temp.path());
    fs::create_dir_all(&paths.state_dir).expect("state dir");
    // The test process itself is the live holder.
    let payload = format!("pid:{} time:2026-01-01T00:00:00.000Z\n", std::process::id());
    fs::write(&paths.lock_path, &payload).expect("write lock");

    let out = run_cli(temp.path(), &["run"]);
    assert_eq!(out.status.code(), Some(exit_codes::LOCKED));
    assert!(String::from_utf8_lossy(&out.stderr).contains("already running"));
    assert!(!paths.state_path.exists());
    assert_eq!(fs::read_to_string(&paths.lock_path).expect("read"), payload);
}

#[test]
fn run_without_config_exits_invalid_and_releases_lock() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(temp.path());

    let out = run_cli(temp.path(), &["run"]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&out.stderr).contains("config not found"));
    assert!(!paths.lock_path.exists());
}

#[test]
fn dry_run_leaves_state_and_origin_untouched() {
    let repo = TestRepo::new().expect("repo");
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(temp.path());
    write_config(&paths, repo.path(), "");

    let out = run_cli(temp.path(), &["run", "--dry-run"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[dry-run]"), "stdout: {stdout}");
    assert!(stdout.contains("would empty commit"));
    assert!(!paths.state_path.exists());
    assert_eq!(
        repo.origin_subjects("main").expect("origin log"),
        vec!["chore: init".to_string()]
    );
}

#[test]
fn run_pushes_and_writes_state() {
    let repo = TestRepo::new().expect("repo");
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(temp.path());
    write_config(&paths, repo.path(), "method = \"heartbeat-file\"\n");

    let out = run_cli(temp.path(), &["run"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&out.stdout).contains("[pushed]"));
    assert!(paths.state_path.exists());
    assert!(!paths.lock_path.exists());
    assert_eq!(
        repo.origin_subjects("main").expect("origin log")[0],
        "chore(heartbeat): pulse"
    );
}

#[test]
fn push_failure_still_exits_ok() {
    let repo = TestRepo::new().expect("repo");
    repo.git(&["remote", "set-url", "origin", "/nonexistent/origin.git"])
        .expect("break origin");
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(temp.path());
    write_config(&paths, repo.path(), "");

    let out = run_cli(temp.path(), &["run"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&out.stdout).contains("[failed]"));
    let state = fs::read_to_string(&paths.state_path).expect("read state");
    assert!(state.contains("\"failures\": 1"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(temp.path());

    let out = run_cli(temp.path(), &["init"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(paths.config_path.exists());

    let out = run_cli(temp.path(), &["init"]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&out.stderr).contains("already exists"));

    let out = run_cli(temp.path(), &["init", "--force"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
}

#[test]
fn check_exits_preflight_failed_for_missing_repo() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(temp.path());
    write_config(&paths, &temp.path().join("gone"), "");

    let out = run_cli(temp.path(), &["check"]);
    assert_eq!(out.status.code(), Some(exit_codes::PREFLIGHT_FAILED));
    assert!(String::from_utf8_lossy(&out.stdout).contains("does not exist"));
    assert!(!paths.state_path.exists());
}

#[test]
fn status_is_read_only() {
    let repo = TestRepo::new().expect("repo");
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(temp.path());
    write_config(&paths, repo.path(), "");

    let out = run_cli(temp.path(), &["status"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&out.stdout).contains("no state yet"));
    assert!(!paths.state_dir.exists());
}
