//! Single-instance lock (`.heartbeat-state/heartbeat.lock`).
//!
//! The marker holds `pid:<pid> time:<RFC 3339>`. A marker whose pid is no longer
//! running is stale and gets reclaimed.
//!
//! - The marker is published fully written with a no-clobber rename, so two
//!   processes racing for a free lock cannot both win and nobody ever sees a
//!   half-written marker.
//! - Removing a stale marker happens only while holding an advisory lock on
//!   `<lock>.reclaim`, after re-reading the marker and finding the same stale
//!   payload. A racer that loses the reclaim reports the lock as busy.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

static PAYLOAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^pid:(\d+)\s+time:(\S+)").expect("lock payload regex is valid")
});

/// Owner recorded in a lock marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub pid: u32,
    pub time: String,
}

/// Result of trying to take the lock.
#[derive(Debug)]
pub enum LockAcquire {
    Acquired(LockGuard),
    /// Another process holds the lock or is reclaiming it. `holder` is `None`
    /// when we lost a race and never read the winner's marker.
    Busy { holder: Option<u32> },
}

/// Held lock. Released on [`LockGuard::release`] or drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the marker. Idempotent.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        release_lock(&self.path)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = release_lock(&self.path) {
            warn!(err = %err, path = %self.path.display(), "failed to release lock");
        }
    }
}

/// Take the lock at `path`, reclaiming it first if the recorded owner is gone.
pub fn acquire_lock(path: &Path) -> Result<LockAcquire> {
    let parent = path
        .parent()
        .with_context(|| format!("lock path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create lock dir {}", parent.display()))?;

    if let Some(observed) = read_marker(path)? {
        match parse_payload(&observed) {
            Some(owner) if is_pid_alive(owner.pid) => {
                info!(pid = owner.pid, since = %owner.time, "lock held by running process");
                return Ok(LockAcquire::Busy {
                    holder: Some(owner.pid),
                });
            }
            Some(owner) => {
                warn!(pid = owner.pid, since = %owner.time, "reclaiming stale lock");
            }
            None => {
                warn!(path = %path.display(), "reclaiming unreadable lock marker");
            }
        }
        if !reclaim_stale(path, &observed)? {
            info!(path = %path.display(), "lost stale lock reclaim");
            return Ok(LockAcquire::Busy { holder: None });
        }
    }

    let mut marker = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp lock in {}", parent.display()))?;
    let payload = format_payload(std::process::id(), Utc::now());
    marker
        .write_all(payload.as_bytes())
        .with_context(|| format!("write temp lock {}", marker.path().display()))?;

    match marker.persist_noclobber(path) {
        Ok(_) => {}
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            info!(path = %path.display(), "lost lock creation race");
            return Ok(LockAcquire::Busy { holder: None });
        }
        Err(err) => {
            return Err(err.error).with_context(|| format!("create lock {}", path.display()));
        }
    }
    debug!(path = %path.display(), "lock acquired");

    Ok(LockAcquire::Acquired(LockGuard {
        path: path.to_path_buf(),
        released: false,
    }))
}

/// Remove the stale marker at `path` if it still holds `observed`.
///
/// Returns false if another process is reclaiming, or the marker changed since
/// it was read.
fn reclaim_stale(path: &Path, observed: &str) -> Result<bool> {
    let reclaim_path = reclaim_path(path);
    let reclaim = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&reclaim_path)
        .with_context(|| format!("open {}", reclaim_path.display()))?;
    if let Err(err) = reclaim.try_lock_exclusive() {
        if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
            return Ok(false);
        }
        return Err(err).with_context(|| format!("lock {}", reclaim_path.display()));
    }

    let reclaimed = match read_marker(path)? {
        None => true,
        Some(current) if current == observed => {
            release_lock(path)?;
            true
        }
        Some(_) => false,
    };
    unlock(&reclaim, &reclaim_path);
    Ok(reclaimed)
}

fn unlock(file: &File, path: &Path) {
    if let Err(err) = FileExt::unlock(file) {
        warn!(err = %err, path = %path.display(), "failed to unlock reclaim guard");
    }
}

fn reclaim_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".reclaim");
    path.with_file_name(name)
}

/// Marker contents, or `None` if there is no marker.
fn read_marker(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read lock {}", path.display())),
    }
}

/// Remove the marker at `path`; a missing marker is not an error.
pub fn release_lock(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "lock released");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove lock {}", path.display())),
    }
}

/// Read the owner recorded at `path`, if any.
pub fn read_owner(path: &Path) -> Result<Option<LockOwner>> {
    Ok(read_marker(path)?.as_deref().and_then(parse_payload))
}

fn format_payload(pid: u32, at: DateTime<Utc>) -> String {
    format!(
        "pid:{pid} time:{}\n",
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

fn parse_payload(contents: &str) -> Option<LockOwner> {
    let caps = PAYLOAD_RE.captures(contents.trim())?;
    let pid = caps[1].parse().ok()?;
    Some(LockOwner {
        pid,
        time: caps[2].to_string(),
    })
}

/// Returns true unless the process is known to be gone.
///
/// Uses `/proc/<pid>` when procfs is mounted, otherwise `kill -0 <pid>`.
/// Anything inconclusive counts as alive, so a live holder is never reclaimed.
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    if Path::new("/proc/self").exists() {
        return Path::new(&format!("/proc/{pid}")).exists();
    }
    let signal = Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .output();
    kill_says_alive(pid, signal)
}

/// Interpret the result of `kill -0 <pid>`.
fn kill_says_alive(pid: u32, signal: std::io::Result<Output>) -> bool {
    match signal {
        Ok(out) if out.status.success() => true,
        // EPERM: the process exists but belongs to another user.
        Ok(out) => String::from_utf8_lossy(&out.stderr)
            .to_ascii_lowercase()
            .contains("not permitted"),
        Err(err) => {
            warn!(pid, err = %err, "cannot run kill, assuming lock holder alive");
            true
        }
    }
}
