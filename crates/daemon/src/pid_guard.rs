// SPDX-License-Identifier: MIT

//! Single-instance startup guard. The teacher's daemon takes an `flock`
//! exclusive lock on a PID file (`fs2::FileExt::try_lock_exclusive`); that
//! crate is not part of this project's dependency stack, so this guard
//! substitutes a PID-liveness check over `nix::sys::signal::kill(pid, None)`
//! — the same "is the previous holder still alive" question, answered by
//! probing the process table instead of taking a file lock.

use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::signal::kill;
use nix::unistd::Pid;

#[derive(Debug, thiserror::Error)]
pub enum PidGuardError {
    #[error("daemon already running with pid {0}")]
    AlreadyRunning(i32),
    #[error("failed to read or write pid file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

#[derive(Debug)]
pub struct PidGuard {
    path: PathBuf,
}

impl PidGuard {
    /// Acquire the guard: fail if `path` names a still-live process, else
    /// overwrite it with this process's pid. The file is left in place for
    /// the life of the process; `release` removes it on clean shutdown.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, PidGuardError> {
        let path = path.into();

        if let Ok(contents) = fs::read_to_string(&path) {
            if let Ok(pid) = contents.trim().parse::<i32>() {
                if process_is_alive(pid) {
                    return Err(PidGuardError::AlreadyRunning(pid));
                }
            }
        }

        fs::write(&path, std::process::id().to_string())
            .map_err(|source| PidGuardError::Io { path: path.clone(), source })?;
        Ok(Self { path })
    }

    pub fn release(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// `kill(pid, None)` sends no signal, only checks whether the target pid
/// still exists and is signalable from this process.
fn process_is_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

pub fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_succeeds_when_no_pid_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wfed.pid");
        let guard = PidGuard::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id() as i32));
        guard.release();
        assert!(!path.exists());
    }

    #[test]
    fn acquire_succeeds_when_pid_file_names_a_dead_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wfed.pid");
        // pid 1 or an extremely high, almost-certainly-unused pid stands in
        // for a dead process without actually spawning and killing one.
        fs::write(&path, "999999").unwrap();
        let guard = PidGuard::acquire(&path).unwrap();
        guard.release();
    }

    #[test]
    fn acquire_rejects_when_pid_file_names_this_live_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wfed.pid");
        fs::write(&path, std::process::id().to_string()).unwrap();
        let err = PidGuard::acquire(&path).unwrap_err();
        assert!(matches!(err, PidGuardError::AlreadyRunning(_)));
    }
}
