// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command runner abstraction.
//!
//! The tmux protocol (and anything else that shells out) is generic over a
//! single `run(args, timeout)` call, so the same code drives a local
//! subprocess or a remote host over SSH. The host-routed implementation
//! lives with the host types; this module provides the local subprocess
//! runner and a scripted fake for tests.

use crate::subprocess::{run_with_timeout, SubprocessError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Result of running a shell command through a [`CommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOutput {
    /// Whether the command exited successfully.
    pub is_success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl RunnerOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            is_success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            is_success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// The most useful error text: stderr when present, stdout otherwise.
    pub fn error_text(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Errors from the execution plumbing itself (not the command's own exit).
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to run command: {0}")]
    Execution(String),
}

impl From<SubprocessError> for RunnerError {
    fn from(e: SubprocessError) -> Self {
        RunnerError::Execution(e.to_string())
    }
}

/// Runs a shell command (as an argv list) with an optional timeout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String], timeout: Option<Duration>)
        -> Result<RunnerOutput, RunnerError>;
}

/// Command runner backed by a local subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(
        &self,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<RunnerOutput, RunnerError> {
        let program = args
            .first()
            .ok_or_else(|| RunnerError::Execution("empty argv".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(&args[1..]);

        let finished = run_with_timeout(cmd, timeout, program).await?;
        Ok(RunnerOutput {
            is_success: finished.is_success(),
            stdout: finished.stdout,
            stderr: finished.stderr,
        })
    }
}

/// A call recorded by [`FakeCommandRunner`].
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

/// Scripted command runner for tests: pops queued outputs and records every
/// call. When the script is exhausted it returns the default output.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeCommandRunner {
    calls: std::sync::Arc<parking_lot::Mutex<Vec<RecordedCommand>>>,
    script: std::sync::Arc<parking_lot::Mutex<std::collections::VecDeque<RunnerOutput>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, output: RunnerOutput) {
        self.script.lock().push_back(output);
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl CommandRunner for FakeCommandRunner {
    async fn run(
        &self,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<RunnerOutput, RunnerError> {
        self.calls.lock().push(RecordedCommand {
            args: args.to_vec(),
            timeout,
        });
        Ok(self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| RunnerOutput::ok("")))
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
