//! PID + mtime lock file.
//!
//! A lock is live while it is younger than the timeout *and* its recorded
//! process still exists. Anything else is stale and gets reclaimed. The pid
//! is written to a side file and hard-linked into place, so a lock never
//! appears without its owner; an unreadable lock still gets a short grace
//! period before it counts as stale. The guard removes the file when dropped, which covers normal returns, `?`
//! propagation, and a task cancelled by a signal handler.

use clawstrap_core::AppError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// How long an unparsable lock is still treated as held.
const UNREADABLE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    pid: u32,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only remove the file if it is still ours.
        let ours = std::fs::read_to_string(&self.path)
            .map(|s| s.trim() == self.pid.to_string())
            .unwrap_or(false);
        if ours {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[derive(Debug)]
pub enum Acquire {
    Acquired(LockGuard),
    /// Another live run owns the lock.
    Held { pid: Option<u32> },
}

/// Is `pid` a running process? `EPERM` means it exists under another user.
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

pub fn acquire(path: &Path, timeout: Duration) -> Result<Acquire, AppError> {
    acquire_with(path, timeout, std::process::id(), process_alive)
}

pub fn acquire_with(
    path: &Path,
    timeout: Duration,
    pid: u32,
    alive: impl Fn(u32) -> bool,
) -> Result<Acquire, AppError> {
    let lock_err = |source| AppError::Lock {
        path: path.display().to_string(),
        source,
    };

    if let Ok(meta) = std::fs::metadata(path) {
        let age = meta
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or(Duration::ZERO);
        match read_pid(path) {
            Some(holder) if age < timeout && alive(holder) => {
                return Ok(Acquire::Held { pid: Some(holder) });
            }
            None if age < UNREADABLE_GRACE => return Ok(Acquire::Held { pid: None }),
            _ => {}
        }
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(lock_err(e)),
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(lock_err)?;
    }

    let mut staged = path.as_os_str().to_owned();
    staged.push(format!(".{pid}"));
    let staged = PathBuf::from(staged);
    std::fs::write(&staged, format!("{pid}\n")).map_err(lock_err)?;
    let linked = std::fs::hard_link(&staged, path);
    let _ = std::fs::remove_file(&staged);
    match linked {
        Ok(()) => {}
        // Lost a race with another run reclaiming the same stale lock.
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Ok(Acquire::Held {
                pid: read_pid(path),
            })
        }
        Err(e) => return Err(lock_err(e)),
    }

    Ok(Acquire::Acquired(LockGuard {
        path: path.to_path_buf(),
        pid,
    }))
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}
