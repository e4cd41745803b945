use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use heartbeat::exit_codes;
use heartbeat::io::git::SystemGit;
use heartbeat::io::init::{InitOptions, init_config};
use heartbeat::io::paths::HeartbeatPaths;
use heartbeat::logging;
use heartbeat::run::{RepoResult, RunOptions, RunOutcome, RunStatus, run_heartbeat};
use heartbeat::status::{CheckEntry, StatusReport, check_repos, collect_status};

#[derive(Parser)]
#[command(
    name = "heartbeat",
    version,
    about = "Rotate small git heartbeats across a fleet of repositories"
)]
struct Cli {
    /// Heartbeat home; state and lock live under `<root>/.heartbeat-state/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file. Defaults to `<root>/heartbeat.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a commented `heartbeat.toml` template.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Send heartbeats to the next batch of repos in the cycle.
    Run {
        /// Report what would happen without touching repos or state.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show config, cycle position, next batch and per-repo history.
    Status,
    /// Preflight every configured repo without changing anything.
    Check,
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let mut paths = HeartbeatPaths::new(cli.root);
    if let Some(config) = cli.config {
        paths = paths.with_config(config);
    }
    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::Run { dry_run } => cmd_run(&paths, dry_run),
        Command::Status => cmd_status(&paths),
        Command::Check => cmd_check(&paths),
    }
}

fn cmd_init(paths: &HeartbeatPaths, force: bool) -> Result<i32> {
    init_config(&paths.config_path, &InitOptions { force })?;
    println!("wrote {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(paths: &HeartbeatPaths, dry_run: bool) -> Result<i32> {
    let status = run_heartbeat(
        paths,
        &RunOptions { dry_run },
        &SystemGit,
        &mut rand::thread_rng(),
    )?;
    match status {
        RunStatus::Locked { holder } => {
            match holder {
                Some(pid) => eprintln!("heartbeat: already running (pid {pid})"),
                None => eprintln!("heartbeat: already running"),
            }
            Ok(exit_codes::LOCKED)
        }
        RunStatus::Completed(outcome) => {
            print_run(&outcome);
            Ok(exit_codes::OK)
        }
    }
}

fn print_run(outcome: &RunOutcome) {
    if outcome.reports.is_empty() {
        println!("nothing selected");
    }
    for report in &outcome.reports {
        let path = report.path.display();
        match &report.result {
            RepoResult::Pushed { action, branch } => {
                println!("[pushed] {path} ({action} -> origin/{branch})");
            }
            RepoResult::WouldPush { plan, .. } => println!("[dry-run] {path}: {plan}"),
            RepoResult::Skipped { reasons } => {
                println!("[skipped] {path}: {}", reasons.join("; "));
            }
            RepoResult::Failed { error } => println!("[failed] {path}: {error}"),
        }
    }
    if outcome.dry_run {
        println!("dry run: state not written");
        return;
    }
    let note = if outcome.reshuffled {
        " (new cycle)"
    } else {
        ""
    };
    println!(
        "cycle position {} -> {}{note}, {} failed",
        outcome.position_before,
        outcome.position_after,
        outcome.failures()
    );
}

fn cmd_status(paths: &HeartbeatPaths) -> Result<i32> {
    let report = collect_status(paths)?;
    print_status(&report);
    Ok(exit_codes::OK)
}

fn print_status(report: &StatusReport) {
    println!("config: {}", report.config_path.display());
    println!("state:  {}", report.state_path.display());
    println!(
        "repos:  {} ({} per run, method {}{})",
        report.repos.len(),
        report.repos_per_run,
        report.method,
        if report.dry_run { ", dry run" } else { "" }
    );
    println!("cycle:  {}/{}", report.position, report.cycle_len);
    if let Some(reason) = &report.reset {
        println!("reset:  {reason}");
    }
    if !report.next_batch.is_empty() {
        println!("next batch:");
        for selected in &report.next_batch {
            println!("  - {}", selected.path.display());
        }
    }
    if !report.history.is_empty() {
        println!("history:");
        for (identity, history) in &report.history {
            let last = match (history.last_action, history.last_success) {
                (Some(action), Some(at)) => format!("{action} at {}", at.to_rfc3339()),
                _ => "never".to_string(),
            };
            print!("  {identity}: last {last}, failures {}", history.failures);
            match &history.last_error {
                Some(error) => println!(" ({error})"),
                None => println!(),
            }
        }
    }
    if let Some(owner) = &report.lock {
        println!("lock:   pid {} since {}", owner.pid, owner.time);
    }
}

fn cmd_check(paths: &HeartbeatPaths) -> Result<i32> {
    let entries = check_repos(paths, &SystemGit)?;
    print_check(&entries);
    if entries.iter().all(|e| e.report.ok) {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::PREFLIGHT_FAILED)
    }
}

fn print_check(entries: &[CheckEntry]) {
    for entry in entries {
        let path = entry.path.display();
        if entry.report.ok {
            let branch = entry.report.branch.as_deref().unwrap_or("?");
            println!("[ok]   {path} (origin/{branch})");
        } else {
            println!("[fail] {path}");
            for error in &entry.report.errors {
                println!("       - {error}");
            }
        }
    }
}
