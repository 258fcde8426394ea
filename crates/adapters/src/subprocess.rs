// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers.
//!
//! [`run_with_timeout`] wraps `tokio::process` with a deadline and graceful
//! shutdown: on expiry the child gets SIGTERM, a short grace period, then
//! SIGKILL. Output read before the deadline is preserved in the returned
//! [`FinishedProcess`] with `is_timed_out` set.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Default timeout for tmux commands.
pub const TMUX_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for CLI subprocess calls made by the backend resolver.
pub const CLI_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period between SIGTERM and SIGKILL on timeout.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from subprocess execution plumbing.
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{description} failed to spawn: {source}")]
    Spawn {
        description: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{description} failed: {source}")]
    Io {
        description: String,
        #[source]
        source: std::io::Error,
    },
}

/// A completed (or timed-out) subprocess with its gathered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedProcess {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was killed or died to a signal.
    pub exit_code: Option<i32>,
    pub is_timed_out: bool,
}

impl FinishedProcess {
    pub fn is_success(&self) -> bool {
        !self.is_timed_out && self.exit_code == Some(0)
    }
}

async fn read_to_end<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}

/// SIGTERM the child, wait up to [`SHUTDOWN_TIMEOUT`], then SIGKILL.
async fn terminate_gracefully(child: &mut Child) {
    if let Some(pid) = child.id() {
        // Best-effort SIGTERM; the child may already be gone.
        let _ = Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .output()
            .await;
    }

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait())
        .await
        .is_err()
    {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

/// Run a command with a timeout, gathering stdout and stderr.
///
/// On timeout the child is shut down gracefully and partial output is
/// returned with `is_timed_out = true`; the caller decides whether that is
/// an error. `None` disables the deadline.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Option<Duration>,
    description: &str,
) -> Result<FinishedProcess, SubprocessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| SubprocessError::Spawn {
        description: description.to_string(),
        source,
    })?;

    let stdout_task = tokio::spawn(read_to_end(child.stdout.take()));
    let stderr_task = tokio::spawn(read_to_end(child.stderr.take()));

    let wait_result = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await,
        None => Ok(child.wait().await),
    };

    let (exit_code, is_timed_out) = match wait_result {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(source)) => {
            return Err(SubprocessError::Io {
                description: description.to_string(),
                source,
            });
        }
        Err(_elapsed) => {
            tracing::warn!(description, "subprocess timed out, shutting it down");
            terminate_gracefully(&mut child).await;
            (None, true)
        }
    };

    // The pipes close once the child is gone, so these complete promptly.
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(FinishedProcess {
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
        exit_code,
        is_timed_out,
    })
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
