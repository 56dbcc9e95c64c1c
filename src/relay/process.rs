//! CLI process spawning and signalling.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

use super::error::{RelayError, SpawnError};
use crate::backends::CommandSpec;

/// Spawn `spec`, falling back to `default_cwd` when the spec has no working directory.
///
/// Stdout is discarded; stderr is captured for failure logs.
pub fn spawn(spec: &CommandSpec, default_cwd: Option<&Path>) -> Result<Child, SpawnError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    if let Some(dir) = spec.cwd.as_deref().or(default_cwd) {
        cmd.current_dir(dir);
    }

    tracing::info!(command = %spec.display(), "Spawning CLI");
    cmd.spawn().map_err(|e| SpawnError::from_io(&spec.program, e))
}

/// Wait for a run to finish and log its outcome.
pub async fn wait_and_log(child: Child, session_id: &str) {
    match child.wait_with_output().await {
        Ok(output) if output.status.success() => {
            tracing::info!(session_id, "CLI run finished");
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                session_id,
                status = %output.status,
                stderr = %stderr.trim(),
                "CLI run failed"
            );
        }
        Err(e) => tracing::warn!(session_id, error = %e, "Failed to wait for CLI run"),
    }
}

/// Send SIGINT to `pid`.
#[cfg(unix)]
pub fn interrupt(pid: u32) -> Result<(), RelayError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| RelayError::Signal(format!("invalid pid {pid}")))?;
    kill(Pid::from_raw(raw), Signal::SIGINT).map_err(|e| RelayError::Signal(e.to_string()))
}

/// Signals are unix-only.
#[cfg(not(unix))]
pub fn interrupt(pid: u32) -> Result<(), RelayError> {
    Err(RelayError::Signal(format!("cannot interrupt {pid} on this platform")))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let spec = CommandSpec::new("vibedeck-definitely-missing-binary");
        assert!(matches!(spawn(&spec, None), Err(SpawnError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_spawn_uses_default_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let spec = CommandSpec::new("sh").arg("-c").arg("pwd > out.txt");
        let child = spawn(&spec, Some(dir.path())).unwrap();
        let status = child.wait_with_output().await.unwrap().status;
        assert!(status.success());
        assert!(dir.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn test_interrupt_stops_process() {
        let spec = CommandSpec::new("sleep").arg("30");
        let mut child = spawn(&spec, None).unwrap();
        interrupt(child.id().unwrap()).unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
    }
}
