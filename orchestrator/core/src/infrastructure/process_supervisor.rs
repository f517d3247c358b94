// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Local Process Supervisor - spawns workers on this host and signals them
//
// Workers are started in their own process group so a terminal interrupt
// reaches the harness only; the harness then tears them down itself.
// Termination targets the pid chosen by the configured `PidAuthority`.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::domain::process::{
    resolve_pid, LaunchSpec, PidAuthority, ProcessError, ProcessHandle, ProcessSupervisor,
    TerminateOutcome,
};

const REAP_GRACE: Duration = Duration::from_secs(2);

type SignalFn = fn(i32, i32) -> std::io::Result<()>;

pub struct LocalProcessSupervisor {
    pid_authority: PidAuthority,
    children: Mutex<HashMap<String, Child>>,
    signal: SignalFn,
}

impl LocalProcessSupervisor {
    pub fn new(pid_authority: PidAuthority) -> Self {
        Self {
            pid_authority,
            children: Mutex::new(HashMap::new()),
            signal: send_signal,
        }
    }

    /// Collect the exit status of the process spawned for `label`, waiting
    /// up to `REAP_GRACE` for it to exit.
    async fn reap(&self, label: &str) {
        let child = self.children.lock().remove(label);
        let Some(mut child) = child else {
            return;
        };

        match tokio::time::timeout(REAP_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(label, %status, "Reaped launcher process"),
            Ok(Err(e)) => debug!(label, error = %e, "Failed to wait on launcher process"),
            // still running; tokio reaps it in the background once it exits
            Err(_) => debug!(label, "Launcher process still running after SIGTERM"),
        }
    }
}

#[async_trait]
impl ProcessSupervisor for LocalProcessSupervisor {
    async fn launch(&self, spec: LaunchSpec) -> Result<ProcessHandle, ProcessError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());

        if spec.foreground {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let spawn_pid = child.id();

        info!(
            label = %spec.label,
            program = %spec.program,
            pid = ?spawn_pid,
            "Launched process"
        );
        self.children.lock().insert(spec.label.clone(), child);

        Ok(ProcessHandle {
            label: spec.label,
            spawn_pid,
            workspace: spec.workspace,
            pid_file: spec.pid_file,
            launched_at: Utc::now(),
        })
    }

    async fn terminate(&self, handle: &ProcessHandle) -> Result<TerminateOutcome, ProcessError> {
        let signaled = match resolve_pid(handle, self.pid_authority) {
            None => {
                warn!(label = %handle.label, pid_file = %handle.pid_file.display(), "No usable pid, nothing to signal");
                Ok(TerminateOutcome::NoPid)
            }
            Some(pid) => match (self.signal)(pid, libc::SIGTERM) {
                Ok(()) => {
                    info!(label = %handle.label, pid, "Sent SIGTERM");
                    Ok(TerminateOutcome::Signaled(pid))
                }
                Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                    debug!(label = %handle.label, pid, "Process already gone");
                    Ok(TerminateOutcome::AlreadyGone(pid))
                }
                Err(source) => Err(ProcessError::Signal {
                    pid,
                    signal: libc::SIGTERM,
                    source,
                }),
            },
        };

        // the pid-file goes even when the signal failed; a signal error wins
        let removed = remove_pid_file(&handle.pid_file);
        self.reap(&handle.label).await;
        let outcome = signaled?;
        removed?;
        Ok(outcome)
    }

    async fn sweep_kill(&self, pattern: &str) -> Result<usize, ProcessError> {
        let output = Command::new("pgrep")
            .arg("-f")
            .arg(pattern)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProcessError::Sweep {
                pattern: pattern.to_string(),
                reason: format!("failed to run pgrep: {}", e),
            })?;

        // pgrep exits 1 when nothing matched
        match output.status.code() {
            Some(0) => {}
            Some(1) => {
                debug!(pattern, "Sweep found no stray processes");
                return Ok(0);
            }
            _ => {
                return Err(ProcessError::Sweep {
                    pattern: pattern.to_string(),
                    reason: format!(
                        "pgrep exited with {}: {}",
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                })
            }
        }

        let own_pid = std::process::id() as i32;
        let mut killed = 0;
        for pid in parse_pids(&String::from_utf8_lossy(&output.stdout), own_pid) {
            match send_signal(pid, libc::SIGKILL) {
                Ok(()) => killed += 1,
                Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {}
                Err(e) => warn!(pattern, pid, error = %e, "Failed to kill stray process"),
            }
        }

        if killed > 0 {
            info!(pattern, killed, "Killed stray processes");
        }
        Ok(killed)
    }
}

/// Pids from `pgrep` output, excluding `own_pid`.
pub fn parse_pids(output: &str, own_pid: i32) -> Vec<i32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0 && *pid != own_pid)
        .collect()
}

fn send_signal(pid: i32, signal: i32) -> std::io::Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(pid, signal) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn remove_pid_file(path: &Path) -> Result<(), ProcessError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ProcessError::PidFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sleep_spec(dir: &Path, label: &str) -> LaunchSpec {
        LaunchSpec {
            label: label.to_string(),
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
            workspace: dir.to_path_buf(),
            pid_file: dir.join(format!("{}.pid", label)),
            foreground: false,
        }
    }

    fn alive(pid: i32) -> bool {
        unsafe { libc::kill(pid, 0) == 0 }
    }

    #[tokio::test]
    async fn test_launch_and_terminate_by_spawn_pid() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = LocalProcessSupervisor::new(PidAuthority::Spawn);

        let handle = supervisor.launch(sleep_spec(dir.path(), "ms-1")).await.unwrap();
        let pid = handle.spawn_pid.unwrap() as i32;
        assert!(alive(pid));

        let outcome = supervisor.terminate(&handle).await.unwrap();
        assert_eq!(outcome, TerminateOutcome::Signaled(pid));

        let mut gone = false;
        for _ in 0..50 {
            if !alive(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone);
    }

    #[tokio::test]
    async fn test_pid_file_authority() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = LocalProcessSupervisor::new(PidAuthority::PidFile);

        let handle = supervisor.launch(sleep_spec(dir.path(), "ms-2")).await.unwrap();
        let pid = handle.spawn_pid.unwrap();
        std::fs::write(&handle.pid_file, pid.to_string()).unwrap();

        let outcome = supervisor.terminate(&handle).await.unwrap();
        assert_eq!(outcome, TerminateOutcome::Signaled(pid as i32));
        assert!(!handle.pid_file.exists());
    }

    #[tokio::test]
    async fn test_missing_or_malformed_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = LocalProcessSupervisor::new(PidAuthority::PidFile);
        let handle = ProcessHandle {
            label: "ms-3".to_string(),
            spawn_pid: None,
            workspace: dir.path().to_path_buf(),
            pid_file: dir.path().join("ms-3.pid"),
            launched_at: Utc::now(),
        };

        assert_eq!(supervisor.terminate(&handle).await.unwrap(), TerminateOutcome::NoPid);

        std::fs::write(&handle.pid_file, "garbage").unwrap();
        assert_eq!(supervisor.terminate(&handle).await.unwrap(), TerminateOutcome::NoPid);
        assert!(!handle.pid_file.exists());
    }

    #[tokio::test]
    async fn test_stale_pid_is_already_gone() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = LocalProcessSupervisor::new(PidAuthority::PidFile);
        let handle = ProcessHandle {
            label: "ms-4".to_string(),
            spawn_pid: None,
            workspace: dir.path().to_path_buf(),
            pid_file: dir.path().join("ms-4.pid"),
            launched_at: Utc::now(),
        };
        // above any pid_max the kernel allows
        std::fs::write(&handle.pid_file, "2147483646").unwrap();

        assert_eq!(
            supervisor.terminate(&handle).await.unwrap(),
            TerminateOutcome::AlreadyGone(2147483646)
        );
    }

    #[tokio::test]
    async fn test_launch_missing_binary() {
        let supervisor = LocalProcessSupervisor::new(PidAuthority::PidFile);
        let spec = LaunchSpec {
            program: "legion-no-such-binary".to_string(),
            ..sleep_spec(&PathBuf::from("/tmp"), "ms-5")
        };
        assert!(matches!(
            supervisor.launch(spec).await,
            Err(ProcessError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_pid_file_removed_when_signal_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = LocalProcessSupervisor {
            signal: |_, _| Err(std::io::Error::from_raw_os_error(libc::EPERM)),
            ..LocalProcessSupervisor::new(PidAuthority::PidFile)
        };
        let handle = ProcessHandle {
            label: "ms-6".to_string(),
            spawn_pid: None,
            workspace: dir.path().to_path_buf(),
            pid_file: dir.path().join("ms-6.pid"),
            launched_at: Utc::now(),
        };
        std::fs::write(&handle.pid_file, "4242").unwrap();

        let err = supervisor.terminate(&handle).await.unwrap_err();
        assert!(matches!(err, ProcessError::Signal { pid: 4242, .. }));
        assert!(!handle.pid_file.exists());
    }

    #[test]
    fn test_parse_pids_skips_self_and_junk() {
        let pids = parse_pids("101\n  202 \nabc\n0\n303\n", 202);
        assert_eq!(pids, vec![101, 303]);
    }
}
