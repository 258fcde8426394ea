// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-transport and command-runner handles for hosts.
//!
//! A connector is how the control plane reaches a host: a local subprocess
//! for the local host, an `ssh` invocation for remote ones. All host file
//! access goes through the connector so the same host code works both ways.

use async_trait::async_trait;
use mng_core::command::CommandResult;
use mng_core::error::MngError;
use mng_adapters::subprocess::run_with_timeout;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for connector commands without an explicit one.
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(120);

/// Escape a string for inclusion inside single quotes in `sh -c`.
///
/// Ends the quote, emits an escaped quote, and reopens: `'` -> `'"'"'`.
pub fn shell_escape_single_quotes(text: &str) -> String {
    text.replace('\'', "'\"'\"'")
}

/// Transport + command runner for one host.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Run a shell command on the host.
    ///
    /// Non-zero exits are reported through `CommandResult::success`, not as
    /// errors; errors mean the transport itself failed.
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, MngError>;

    /// Write a file on the host, creating parent directories.
    async fn write_file(
        &self,
        path: &Path,
        contents: &str,
        mode: Option<u32>,
    ) -> Result<(), MngError>;

    /// Read a file's contents, or `None` when it does not exist.
    async fn read_file(&self, path: &Path) -> Result<Option<String>, MngError>;

    /// List the entry names of a directory; empty when it does not exist.
    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, MngError>;

    /// Copy a local directory's contents into a directory on the host.
    async fn copy_dir_from_local(&self, local_src: &Path, remote_dst: &Path)
        -> Result<(), MngError>;

    /// Copy a single local file onto the host.
    async fn copy_file_from_local(
        &self,
        local_src: &Path,
        remote_dst: &Path,
    ) -> Result<(), MngError>;

    /// Whether this connector reaches the local machine.
    fn is_local(&self) -> bool;
}

/// Connector for the local machine: `sh -c` subprocesses and direct fs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, MngError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        let finished = run_with_timeout(
            cmd,
            Some(timeout.unwrap_or(DEFAULT_EXECUTE_TIMEOUT)),
            "local command",
        )
        .await
        .map_err(|e| MngError::CommandFailed(e.to_string()))?;

        if finished.is_timed_out {
            return Err(MngError::CommandTimeout {
                timeout_seconds: timeout.unwrap_or(DEFAULT_EXECUTE_TIMEOUT).as_secs_f64(),
            });
        }

        Ok(CommandResult {
            stdout: finished.stdout,
            stderr: finished.stderr,
            success: finished.exit_code == Some(0),
        })
    }

    async fn write_file(
        &self,
        path: &Path,
        contents: &str,
        mode: Option<u32>,
    ) -> Result<(), MngError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MngError::io(parent, e))?;
        }

        // Atomic: write a sibling temp file, then rename over the target.
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, contents)
            .await
            .map_err(|e| MngError::io(&tmp_path, e))?;
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| MngError::io(&tmp_path, e))?;
        }
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| MngError::io(path, e))
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, MngError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MngError::io(path, e)),
        }
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, MngError> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(MngError::io(path, e)),
        };
        while let Some(entry) = dir.next_entry().await.map_err(|e| MngError::io(path, e))? {
            entries.push(entry.file_name().to_string_lossy().to_string());
        }
        entries.sort();
        Ok(entries)
    }

    async fn copy_dir_from_local(
        &self,
        local_src: &Path,
        remote_dst: &Path,
    ) -> Result<(), MngError> {
        let command = format!(
            "mkdir -p '{}' && cp -a '{}/.' '{}/'",
            shell_escape_single_quotes(&remote_dst.display().to_string()),
            shell_escape_single_quotes(&local_src.display().to_string()),
            shell_escape_single_quotes(&remote_dst.display().to_string()),
        );
        let result = self.execute(&command, None).await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "copy into {} failed: {}",
                remote_dst.display(),
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn copy_file_from_local(
        &self,
        local_src: &Path,
        remote_dst: &Path,
    ) -> Result<(), MngError> {
        if let Some(parent) = remote_dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MngError::io(parent, e))?;
        }
        tokio::fs::copy(local_src, remote_dst)
            .await
            .map_err(|e| MngError::io(local_src, e))?;
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// SSH endpoint details for a remote host connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEndpoint {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub key_path: PathBuf,
}

impl SshEndpoint {
    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key_path.display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
        ]
    }
}

/// Connector for a remote host over OpenSSH.
#[derive(Debug, Clone)]
pub struct SshConnector {
    endpoint: SshEndpoint,
}

/// Exit code OpenSSH uses for connection-level failures.
const SSH_CONNECTION_FAILURE_EXIT: i32 = 255;

impl SshConnector {
    pub fn new(endpoint: SshEndpoint) -> Self {
        Self { endpoint }
    }

    async fn run_ssh(
        &self,
        remote_command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, MngError> {
        let mut args = vec!["ssh".to_string()];
        args.extend(self.endpoint.base_args());
        args.push(self.endpoint.destination());
        args.push("--".to_string());
        args.push(remote_command.to_string());

        // Transient connects get exactly one retry; command failures do not.
        for attempt in 0..2 {
            let mut cmd = Command::new(&args[0]);
            cmd.args(&args[1..]);
            let finished = run_with_timeout(
                cmd,
                Some(timeout.unwrap_or(DEFAULT_EXECUTE_TIMEOUT)),
                "ssh command",
            )
            .await
            .map_err(|e| MngError::CommandFailed(e.to_string()))?;

            if finished.is_timed_out {
                return Err(MngError::CommandTimeout {
                    timeout_seconds: timeout.unwrap_or(DEFAULT_EXECUTE_TIMEOUT).as_secs_f64(),
                });
            }

            if finished.exit_code == Some(SSH_CONNECTION_FAILURE_EXIT) && attempt == 0 {
                tracing::warn!(
                    host = %self.endpoint.host,
                    stderr = %finished.stderr.trim(),
                    "ssh connection failed, retrying once"
                );
                continue;
            }

            return Ok(CommandResult {
                stdout: finished.stdout,
                stderr: finished.stderr,
                success: finished.exit_code == Some(0),
            });
        }

        Err(MngError::HostOffline(self.endpoint.host.clone()))
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, MngError> {
        self.run_ssh(command, timeout).await
    }

    async fn write_file(
        &self,
        path: &Path,
        contents: &str,
        mode: Option<u32>,
    ) -> Result<(), MngError> {
        let path_str = shell_escape_single_quotes(&path.display().to_string());
        let escaped = shell_escape_single_quotes(contents);
        let chmod = match mode {
            Some(mode) => format!(" && chmod {:o} '{}'", mode, path_str),
            None => String::new(),
        };
        let command = format!(
            "mkdir -p \"$(dirname '{path}')\" && printf '%s' '{contents}' > '{path}.tmp' \
             && mv '{path}.tmp' '{path}'{chmod}",
            path = path_str,
            contents = escaped,
            chmod = chmod,
        );
        let result = self.run_ssh(&command, None).await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "write of {} failed: {}",
                path.display(),
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, MngError> {
        let path_str = shell_escape_single_quotes(&path.display().to_string());
        let command = format!("if [ -f '{p}' ]; then cat '{p}'; else echo MNG_NO_FILE >&2; exit 9; fi", p = path_str);
        let result = self.run_ssh(&command, None).await?;
        if result.success {
            Ok(Some(result.stdout))
        } else if result.stderr.contains("MNG_NO_FILE") {
            Ok(None)
        } else {
            Err(MngError::CommandFailed(format!(
                "read of {} failed: {}",
                path.display(),
                result.stderr.trim()
            )))
        }
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, MngError> {
        let path_str = shell_escape_single_quotes(&path.display().to_string());
        let command = format!("[ -d '{p}' ] && ls -1 '{p}' || true", p = path_str);
        let result = self.run_ssh(&command, None).await?;
        Ok(result
            .stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn copy_dir_from_local(
        &self,
        local_src: &Path,
        remote_dst: &Path,
    ) -> Result<(), MngError> {
        let mkdir = format!(
            "mkdir -p '{}'",
            shell_escape_single_quotes(&remote_dst.display().to_string())
        );
        let result = self.run_ssh(&mkdir, None).await?;
        if !result.success {
            return Err(MngError::CommandFailed(result.stderr.trim().to_string()));
        }

        let mut args: Vec<String> = vec![
            "rsync".to_string(),
            "-a".to_string(),
            "-e".to_string(),
            format!(
                "ssh -i {} -p {} -o BatchMode=yes",
                self.endpoint.key_path.display(),
                self.endpoint.port
            ),
            format!("{}/", local_src.display()),
            format!("{}:{}/", self.endpoint.destination(), remote_dst.display()),
        ];
        let mut cmd = Command::new(args.remove(0));
        cmd.args(&args);
        let finished = run_with_timeout(cmd, Some(DEFAULT_EXECUTE_TIMEOUT), "rsync")
            .await
            .map_err(|e| MngError::CommandFailed(e.to_string()))?;
        if !finished.is_success() {
            return Err(MngError::CommandFailed(format!(
                "rsync to {} failed: {}",
                remote_dst.display(),
                finished.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn copy_file_from_local(
        &self,
        local_src: &Path,
        remote_dst: &Path,
    ) -> Result<(), MngError> {
        let contents = tokio::fs::read_to_string(local_src)
            .await
            .map_err(|e| MngError::io(local_src, e))?;
        self.write_file(remote_dst, &contents, None).await
    }

    fn is_local(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;
