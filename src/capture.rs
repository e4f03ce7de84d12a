/// Direct-mode output capture: run a shell command with stderr folded into
/// stdout, drain it chunk by chunk, and persist it as a timestamped artifact.
use crate::error::WatchdogError;
use crate::supervisor::GUARD_VAR;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Everything a finished direct-mode command produced.
#[derive(Debug)]
pub struct CapturedRun {
    pub output: Vec<u8>,
    pub status: ExitStatus,
}

/// Read `reader` to end-of-stream in `chunk_size` pieces.
pub async fn drain<R>(mut reader: R, chunk_size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut output = Vec::new();
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        output.extend_from_slice(&buf[..n]);
    }
    Ok(output)
}

/// `sh -c <script>` with the detach guard stripped from its environment.
///
/// The guard marks only the worker itself; a `watchdog` started from inside
/// the monitored command must hand off like any other invocation.
pub fn shell_command(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(script)
        .env_remove(GUARD_VAR)
        .stdin(Stdio::null());
    cmd
}

/// Run `command` through `sh -c` and collect its combined output.
///
/// Stderr is merged by the shell (`exec 2>&1`) so the bytes arrive in the
/// order the command wrote them.
pub async fn run_captured(command: &str, chunk_size: usize) -> Result<CapturedRun, WatchdogError> {
    let script = format!("exec 2>&1\n{command}");
    let mut child = shell_command(&script)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| WatchdogError::Spawn {
            program: "sh".to_string(),
            source: e,
        })?;

    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, command, "command started");

    let output = match child.stdout.take() {
        Some(stdout) => drain(stdout, chunk_size).await.map_err(|e| WatchdogError::Io {
            context: "failed to read command output".to_string(),
            source: e,
        })?,
        None => Vec::new(),
    };

    let status = child.wait().await.map_err(|e| WatchdogError::Io {
        context: "failed to wait for command".to_string(),
        source: e,
    })?;

    tracing::info!(
        exit_code = ?status.code(),
        output_bytes = output.len(),
        "command finished"
    );

    Ok(CapturedRun { output, status })
}

/// File name for an artifact created at `now`: `monitor_YYYYMMDD_HHMMSS.log`.
pub fn artifact_name(now: DateTime<Local>) -> String {
    now.format("monitor_%Y%m%d_%H%M%S.log").to_string()
}

/// Local record of one direct-mode run.
///
/// Holds the captured output until delivery fails, at which point it is
/// replaced wholesale by the delivery error.
#[derive(Debug)]
pub struct CaptureArtifact {
    path: PathBuf,
}

impl CaptureArtifact {
    /// Write `output` to a freshly named file in `dir`.
    pub fn create(dir: &Path, now: DateTime<Local>, output: &[u8]) -> Result<Self, WatchdogError> {
        let path = dir.join(artifact_name(now));
        std::fs::write(&path, output).map_err(|e| WatchdogError::Io {
            context: format!("failed to write artifact {}", path.display()),
            source: e,
        })?;
        tracing::info!(path = %path.display(), bytes = output.len(), "artifact written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Replace the captured output with a delivery failure record.
    ///
    /// Consumes the artifact so the overwrite can happen only once.
    pub fn replace_with_failure(self, detail: &str) -> Result<PathBuf, WatchdogError> {
        std::fs::write(&self.path, detail).map_err(|e| WatchdogError::Io {
            context: format!("failed to write fallback record {}", self.path.display()),
            source: e,
        })?;
        tracing::warn!(path = %self.path.display(), "artifact replaced with delivery error");
        Ok(self.path)
    }
}
