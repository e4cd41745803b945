//! End-to-end rotation against real repositories with bare origins.
//!
//! These tests drive `run_heartbeat` across several invocations to verify
//! cycle progression, reshuffling, the pulse/beat toggle, and recovery from a
//! resized repo list. One scenario keeps the heartbeat home inside a managed
//! working copy.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use heartbeat::core::types::HeartbeatAction;
use heartbeat::io::git::SystemGit;
use heartbeat::io::paths::HeartbeatPaths;
use heartbeat::io::run_state::RunState;
use heartbeat::run::{RepoResult, RunOptions, RunOutcome, RunStatus, run_heartbeat};
use heartbeat::test_support::TestRepo;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn write_config(paths: &HeartbeatPaths, repos: &[&Path], per_run: usize) {
    let list: Vec<String> = repos
        .iter()
        .map(|p| format!("{:?}", p.to_string_lossy()))
        .collect();
    fs::write(
        &paths.config_path,
        format!(
            "version = 1\nrepos = [{}]\nrepos_per_run = {per_run}\n",
            list.join(", ")
        ),
    )
    .expect("write config");
}

fn run_once(paths: &HeartbeatPaths, rng: &mut StdRng) -> RunOutcome {
    match run_heartbeat(paths, &RunOptions::default(), &SystemGit, rng).expect("run") {
        RunStatus::Completed(outcome) => outcome,
        RunStatus::Locked { holder } => panic!("unexpected lock held by {holder:?}"),
    }
}

fn read_state(paths: &HeartbeatPaths) -> RunState {
    let raw = fs::read_to_string(&paths.state_path).expect("read state");
    serde_json::from_str(&raw).expect("parse state")
}

fn pushed_paths(outcome: &RunOutcome) -> Vec<PathBuf> {
    outcome
        .reports
        .iter()
        .map(|r| {
            assert!(
                matches!(r.result, RepoResult::Pushed { .. }),
                "{}: {:?}",
                r.path.display(),
                r.result
            );
            r.path.clone()
        })
        .collect()
}

/// Five repos, two per run.
///
/// ```text
/// cycle 1: run 1 -> pos 2, run 2 -> pos 4, run 3 -> pos 5 -> reshuffle to 0
/// cycle 2: same again, every repo toggles from pulse to beat
/// ```
#[test]
fn five_repos_rotate_through_two_full_cycles() {
    let repos: Vec<TestRepo> = (0..5).map(|_| TestRepo::new().expect("repo")).collect();
    let home = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(home.path());
    let repo_paths: Vec<&Path> = repos.iter().map(TestRepo::path).collect();
    write_config(&paths, &repo_paths, 2);
    let mut rng = StdRng::seed_from_u64(42);

    for (expected_action, subject) in [
        (HeartbeatAction::Pulse, "chore(heartbeat): pulse"),
        (HeartbeatAction::Beat, "chore(heartbeat): beat"),
    ] {
        let mut visited = HashSet::new();
        for (expected_len, expected_pos, expect_reshuffle) in
            [(2, 2, false), (2, 4, false), (1, 0, true)]
        {
            let outcome = run_once(&paths, &mut rng);
            assert_eq!(outcome.reports.len(), expected_len);
            assert_eq!(outcome.position_after, expected_pos);
            assert_eq!(outcome.reshuffled, expect_reshuffle);
            for path in pushed_paths(&outcome) {
                assert!(visited.insert(path), "repo visited twice in one cycle");
            }
            for report in &outcome.reports {
                assert!(matches!(
                    report.result,
                    RepoResult::Pushed { action, .. } if action == expected_action
                ));
            }
        }
        assert_eq!(visited.len(), 5);
        for repo in &repos {
            let subjects = repo.origin_subjects("main").expect("origin log");
            assert_eq!(subjects[0], subject);
        }
    }

    let state = read_state(&paths);
    assert_eq!(state.cycle.position, 0);
    assert_eq!(state.repos.len(), 5);
    assert!(
        state
            .repos
            .values()
            .all(|h| h.failures == 0 && h.last_action == Some(HeartbeatAction::Beat))
    );
    assert!(!paths.lock_path.exists());
}

/// Shrinking the repo list reshuffles the cycle and keeps every history entry.
#[test]
fn repo_list_resize_keeps_history() {
    let repos: Vec<TestRepo> = (0..3).map(|_| TestRepo::new().expect("repo")).collect();
    let home = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(home.path());
    let all: Vec<&Path> = repos.iter().map(TestRepo::path).collect();
    write_config(&paths, &all, 3);
    let mut rng = StdRng::seed_from_u64(7);

    run_once(&paths, &mut rng);
    let before = read_state(&paths);
    assert_eq!(before.repos.len(), 3);

    write_config(&paths, &all[..2], 1);
    let outcome = run_once(&paths, &mut rng);
    assert_eq!(outcome.position_before, 0);
    assert_eq!(outcome.reports.len(), 1);
    assert!(matches!(
        outcome.reports[0].result,
        RepoResult::Pushed {
            action: HeartbeatAction::Beat,
            ..
        }
    ));

    let after = read_state(&paths);
    assert_eq!(after.cycle.order.len(), 2);
    assert_eq!(after.cycle.position, 1);
    assert_eq!(after.repos.len(), 3);
    let untouched = repos[2].origin().to_string_lossy().to_string();
    assert_eq!(after.repos[&untouched], before.repos[&untouched]);
}

/// A dirty working copy is skipped and its origin is left alone.
#[test]
fn dirty_repo_is_skipped_without_push() {
    let repo = TestRepo::new().expect("repo");
    fs::write(repo.path().join("scratch.txt"), "wip\n").expect("write scratch");
    let home = tempfile::tempdir().expect("tempdir");
    let paths = HeartbeatPaths::new(home.path());
    write_config(&paths, &[repo.path()], 1);

    let outcome = run_once(&paths, &mut StdRng::seed_from_u64(1));
    assert!(matches!(
        &outcome.reports[0].result,
        RepoResult::Skipped { reasons } if reasons.iter().any(|r| r.contains("uncommitted"))
    ));
    assert_eq!(
        repo.origin_subjects("main").expect("origin log"),
        vec!["chore: init".to_string()]
    );
    assert!(read_state(&paths).repos.is_empty());
}

/// State kept inside a managed working copy does not make that copy dirty.
#[test]
fn home_inside_managed_repo_stays_clean() {
    let repo = TestRepo::new().expect("repo");
    let config_home = tempfile::tempdir().expect("tempdir");
    let paths =
        HeartbeatPaths::new(repo.path()).with_config(config_home.path().join("heartbeat.toml"));
    write_config(&paths, &[repo.path()], 1);
    let mut rng = StdRng::seed_from_u64(3);

    for _ in 0..2 {
        let outcome = run_once(&paths, &mut rng);
        assert_eq!(pushed_paths(&outcome), vec![repo.path().to_path_buf()]);
    }
    assert!(paths.state_path.starts_with(repo.path()));
    assert_eq!(
        repo.git(&["status", "--porcelain=v1", "-uall"]).expect("status"),
        ""
    );
    assert_eq!(
        repo.origin_subjects("main").expect("origin log"),
        vec![
            "chore(heartbeat): beat".to_string(),
            "chore(heartbeat): pulse".to_string(),
            "chore: init".to_string(),
        ]
    );
}
