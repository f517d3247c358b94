// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which pid `terminate` signals.
///
/// A daemonizing worker forks after spawn, so the pid it writes to its
/// pid-file can differ from the pid the harness spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PidAuthority {
    /// Only the pid recorded in the pid-file
    #[default]
    PidFile,
    /// Only the pid returned by spawn
    Spawn,
    /// The pid-file when it holds a pid, the spawn pid otherwise
    PidFileOrSpawn,
}

/// How to start one worker or control-plane process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Identity id, or `master` for the control plane
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub workspace: PathBuf,
    pub pid_file: PathBuf,
    /// Inherit the terminal instead of detaching
    pub foreground: bool,
}

impl LaunchSpec {
    /// `<binary> -c <config-dir> --pid-file <pid-file> [-l info | -d]`
    pub fn daemon(
        label: impl Into<String>,
        binary: &str,
        config_dir: &Path,
        pid_file: &Path,
        foreground: bool,
    ) -> Self {
        let mut args = vec![
            "-c".to_string(),
            config_dir.display().to_string(),
            "--pid-file".to_string(),
            pid_file.display().to_string(),
        ];
        if foreground {
            args.extend(["-l".to_string(), "info".to_string()]);
        } else {
            args.push("-d".to_string());
        }

        Self {
            label: label.into(),
            program: binary.to_string(),
            args,
            workspace: config_dir.to_path_buf(),
            pid_file: pid_file.to_path_buf(),
            foreground,
        }
    }
}

/// A launched process the supervisor can later signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub label: String,
    /// Pid returned by spawn
    pub spawn_pid: Option<u32>,
    pub workspace: PathBuf,
    pub pid_file: PathBuf,
    pub launched_at: DateTime<Utc>,
}

/// Result of a terminate request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    Signaled(i32),
    /// The pid no longer named a live process
    AlreadyGone(i32),
    /// No usable pid (missing or malformed pid-file)
    NoPid,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send signal {signal} to process {pid}: {source}")]
    Signal {
        pid: i32,
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove pid file {path:?}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Process sweep for '{pattern}' failed: {reason}")]
    Sweep { pattern: String, reason: String },
}

/// Starts, signals and sweeps worker and control-plane processes.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn launch(&self, spec: LaunchSpec) -> Result<ProcessHandle, ProcessError>;

    /// Send the termination signal and remove the pid-file.
    async fn terminate(&self, handle: &ProcessHandle) -> Result<TerminateOutcome, ProcessError>;

    /// Kill every process whose command line contains `pattern`. Returns how
    /// many were signaled.
    async fn sweep_kill(&self, pattern: &str) -> Result<usize, ProcessError>;
}

/// Parse a pid-file. Missing, unreadable or malformed files yield `None`.
pub fn read_pid_file(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0)
}

/// Pick the pid to signal for `handle`.
pub fn resolve_pid(handle: &ProcessHandle, authority: PidAuthority) -> Option<i32> {
    let spawned = handle.spawn_pid.and_then(|pid| i32::try_from(pid).ok());
    match authority {
        PidAuthority::PidFile => read_pid_file(&handle.pid_file),
        PidAuthority::Spawn => spawned,
        PidAuthority::PidFileOrSpawn => read_pid_file(&handle.pid_file).or(spawned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(dir: &Path, spawn_pid: Option<u32>) -> ProcessHandle {
        ProcessHandle {
            label: "ms-1".to_string(),
            spawn_pid,
            workspace: dir.to_path_buf(),
            pid_file: dir.join("ms-1.pid"),
            launched_at: Utc::now(),
        }
    }

    #[test]
    fn test_daemon_args_background() {
        let spec = LaunchSpec::daemon(
            "ms-1",
            "salt-minion",
            Path::new("/w/ms-1"),
            Path::new("/w/ms-1/ms-1.pid"),
            false,
        );
        assert_eq!(
            spec.args,
            vec!["-c", "/w/ms-1", "--pid-file", "/w/ms-1/ms-1.pid", "-d"]
        );
        assert_eq!(spec.workspace, PathBuf::from("/w/ms-1"));
    }

    #[test]
    fn test_daemon_args_foreground() {
        let spec = LaunchSpec::daemon(
            "master",
            "salt-master",
            Path::new("/w/master"),
            Path::new("/w/master/master.pid"),
            true,
        );
        assert_eq!(spec.args[4..], ["-l".to_string(), "info".to_string()]);
        assert!(spec.foreground);
    }

    #[test]
    fn test_read_pid_file_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.pid");

        assert_eq!(read_pid_file(&path), None);

        std::fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid_file(&path), Some(4242));

        std::fs::write(&path, "not-a-pid").unwrap();
        assert_eq!(read_pid_file(&path), None);

        std::fs::write(&path, "0").unwrap();
        assert_eq!(read_pid_file(&path), None);
    }

    #[test]
    fn test_pid_authority() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle(dir.path(), Some(100));

        assert_eq!(resolve_pid(&h, PidAuthority::PidFile), None);
        assert_eq!(resolve_pid(&h, PidAuthority::Spawn), Some(100));
        assert_eq!(resolve_pid(&h, PidAuthority::PidFileOrSpawn), Some(100));

        std::fs::write(&h.pid_file, "200").unwrap();
        assert_eq!(resolve_pid(&h, PidAuthority::PidFile), Some(200));
        assert_eq!(resolve_pid(&h, PidAuthority::Spawn), Some(100));
        assert_eq!(resolve_pid(&h, PidAuthority::PidFileOrSpawn), Some(200));
    }
}
