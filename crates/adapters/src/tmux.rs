// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux pane control with marker-based message synchronization.
//!
//! Feeding text into an interactive TUI through tmux is race-prone:
//! `send-keys` returns as soon as keystrokes are queued, but the TUI may not
//! have consumed them, and an early Enter submits a truncated prompt. The
//! send protocol closes the race by appending a unique marker, waiting for
//! it to appear in the pane, deleting it with backspaces, verifying the
//! message tail is visible, and only then submitting, with the Enter
//! confirmed through a `tmux wait-for` channel signaled by the TUI's own
//! prompt-submitted hook.

use crate::runner::{CommandRunner, RunnerOutput};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How long to wait for the marker to appear and then disappear.
pub const SEND_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single `capture-pane` call.
pub const CAPTURE_PANE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the submission signal after Enter. Needs to be
/// fairly long: a loaded machine can take a while to run the hook.
pub const ENTER_SUBMISSION_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix of the `wait-for` channel the prompt-submitted hook signals.
pub const SUBMIT_WAIT_CHANNEL_PREFIX: &str = "mng-submit-";

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Failed to send a message to a tmux pane.
#[derive(Debug, Error)]
#[error("Failed to send message to tmux pane {target}: {reason}")]
pub struct TmuxSendError {
    pub target: String,
    pub reason: String,
}

impl TmuxSendError {
    fn new(target: &str, reason: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// The last `n` characters of the final line of a message.
///
/// Only that portion is visible on the current input line of the pane, so
/// it is what the protocol verifies after removing the marker.
fn message_tail(message: &str, n: usize) -> String {
    let last_line = message.rsplit('\n').next().unwrap_or(message);
    let chars: Vec<char> = last_line.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

/// Tmux operations over an abstract command runner.
///
/// The runner decides where the `tmux` binary actually executes: a local
/// subprocess for local hosts, or `execute_command` on a remote host.
#[derive(Clone)]
pub struct TmuxController<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> TmuxController<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn run(
        &self,
        args: &[&str],
        timeout: Option<Duration>,
        target: &str,
    ) -> Result<RunnerOutput, TmuxSendError> {
        let argv: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner
            .run(&argv, timeout)
            .await
            .map_err(|e| TmuxSendError::new(target, e.to_string()))
    }

    /// Send a message to a pane using marker-based synchronization.
    ///
    /// On failure, partial text including the marker may remain in the input
    /// field. Cleanup is deliberately not attempted: deleting text risks
    /// removing part of the user's message, and stale marker text is safer
    /// than data loss.
    pub async fn send_message(&self, target: &str, message: &str) -> Result<(), TmuxSendError> {
        let marker = uuid::Uuid::new_v4().simple().to_string();
        let message_with_marker = format!("{}{}", message, marker);

        // Literal mode so tmux does not interpret key names; `--` guards
        // against messages starting with a dash.
        let result = self
            .run(
                &["tmux", "send-keys", "-t", target, "-l", "--", &message_with_marker],
                None,
                target,
            )
            .await?;
        if !result.is_success {
            return Err(TmuxSendError::new(
                target,
                format!("tmux send-keys failed: {}", result.error_text()),
            ));
        }

        self.wait_for_marker_visible(target, &marker).await?;
        self.send_backspaces_with_noop(target, marker.len()).await?;

        let expected_ending = message_tail(message, 32);
        self.wait_for_message_ending(target, &marker, &expected_ending)
            .await?;

        self.send_enter_and_wait(target).await
    }

    /// Capture the current pane content, returning `None` on failure.
    pub async fn capture_pane(&self, target: &str) -> Option<String> {
        let result = self
            .run(
                &["tmux", "capture-pane", "-t", target, "-p"],
                Some(CAPTURE_PANE_TIMEOUT),
                target,
            )
            .await
            .ok()?;
        if result.is_success {
            Some(result.stdout.trim_end().to_string())
        } else {
            None
        }
    }

    /// Whether a session with this exact name exists.
    pub async fn has_session(&self, name: &str) -> Result<bool, TmuxSendError> {
        // `=` forces an exact match instead of tmux's prefix matching.
        let target = format!("={}", name);
        let result = self
            .run(&["tmux", "has-session", "-t", &target], Some(CAPTURE_PANE_TIMEOUT), name)
            .await?;
        Ok(result.is_success)
    }

    /// Create a detached session running `command` in `cwd`.
    pub async fn new_session(
        &self,
        name: &str,
        cwd: &Path,
        command: &str,
        env: &[(String, String)],
    ) -> Result<(), TmuxSendError> {
        let cwd_str = cwd.display().to_string();
        let mut args: Vec<String> = vec![
            "tmux".into(),
            "new-session".into(),
            "-d".into(),
            "-s".into(),
            name.into(),
            "-c".into(),
            cwd_str,
        ];
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{}={}", key, value));
        }
        args.push(command.into());

        let result = self
            .runner
            .run(&args, Some(CAPTURE_PANE_TIMEOUT))
            .await
            .map_err(|e| TmuxSendError::new(name, e.to_string()))?;
        if !result.is_success {
            return Err(TmuxSendError::new(
                name,
                format!("tmux new-session failed: {}", result.error_text()),
            ));
        }
        Ok(())
    }

    /// Send literal text without the submit handshake.
    ///
    /// For bare processes reading a tty; interactive TUIs go through
    /// [`TmuxController::send_message`] instead.
    pub async fn send_literal(&self, target: &str, text: &str) -> Result<(), TmuxSendError> {
        let result = self
            .run(&["tmux", "send-keys", "-t", target, "-l", "--", text], None, target)
            .await?;
        if !result.is_success {
            return Err(TmuxSendError::new(
                target,
                format!("tmux send-keys failed: {}", result.error_text()),
            ));
        }
        Ok(())
    }

    /// Send the Enter key.
    pub async fn send_enter(&self, target: &str) -> Result<(), TmuxSendError> {
        let result = self
            .run(&["tmux", "send-keys", "-t", target, "Enter"], None, target)
            .await?;
        if !result.is_success {
            return Err(TmuxSendError::new(
                target,
                format!("tmux send-keys Enter failed: {}", result.error_text()),
            ));
        }
        Ok(())
    }

    /// Kill a session. Succeeds even if the session is already gone.
    pub async fn kill_session(&self, name: &str) -> Result<(), TmuxSendError> {
        let target = format!("={}", name);
        let _ = self
            .run(&["tmux", "kill-session", "-t", &target], Some(CAPTURE_PANE_TIMEOUT), name)
            .await?;
        Ok(())
    }

    /// Wait until the marker is visible somewhere in the pane.
    ///
    /// Somewhere, not at the end: TUIs often render a status line below the
    /// input area.
    async fn wait_for_marker_visible(
        &self,
        target: &str,
        marker: &str,
    ) -> Result<(), TmuxSendError> {
        let deadline = tokio::time::Instant::now() + SEND_MESSAGE_TIMEOUT;
        loop {
            if let Some(content) = self.capture_pane(target).await {
                if content.contains(marker) {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TmuxSendError::new(
                    target,
                    format!(
                        "Timeout waiting for message marker to appear (waited {:.1}s)",
                        SEND_MESSAGE_TIMEOUT.as_secs_f64()
                    ),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Send backspaces to delete the marker, then a Left/Right no-op pair.
    ///
    /// The no-op keys reset an input-handler state in which a subsequent
    /// Enter would be taken as a literal newline instead of a submit.
    async fn send_backspaces_with_noop(
        &self,
        target: &str,
        count: usize,
    ) -> Result<(), TmuxSendError> {
        if count > 0 {
            let mut args: Vec<String> =
                vec!["tmux".into(), "send-keys".into(), "-t".into(), target.into()];
            args.extend(std::iter::repeat_n("BSpace".to_string(), count));
            let result = self
                .runner
                .run(&args, None)
                .await
                .map_err(|e| TmuxSendError::new(target, e.to_string()))?;
            if !result.is_success {
                return Err(TmuxSendError::new(
                    target,
                    format!("tmux send-keys BSpace failed: {}", result.error_text()),
                ));
            }
        }

        let result = self
            .run(&["tmux", "send-keys", "-t", target, "Left", "Right"], None, target)
            .await?;
        if !result.is_success {
            tracing::warn!(target, stderr = %result.error_text(), "failed to send noop keys");
        }
        Ok(())
    }

    /// Wait until the marker is gone and the expected message tail shows.
    async fn wait_for_message_ending(
        &self,
        target: &str,
        marker: &str,
        expected_ending: &str,
    ) -> Result<(), TmuxSendError> {
        let deadline = tokio::time::Instant::now() + SEND_MESSAGE_TIMEOUT;
        loop {
            if let Some(content) = self.capture_pane(target).await {
                if !content.contains(marker) && content.contains(expected_ending) {
                    tracing::trace!(target, "marker removed and expected content visible");
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TmuxSendError::new(
                    target,
                    format!(
                        "Timeout waiting for message to be ready for submission (waited {:.1}s)",
                        SEND_MESSAGE_TIMEOUT.as_secs_f64()
                    ),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Send Enter and wait for the submission signal from the TUI's hook.
    ///
    /// The `wait-for` is started *before* Enter is sent (in one shell
    /// invocation) so the hook cannot fire before anyone is listening.
    async fn send_enter_and_wait(&self, target: &str) -> Result<(), TmuxSendError> {
        let wait_channel = format!("{}{}", SUBMIT_WAIT_CHANNEL_PREFIX, target);
        let timeout_seconds = ENTER_SUBMISSION_WAIT_TIMEOUT.as_secs().to_string();
        let script = r#"timeout $0 tmux wait-for "$1" & W=$!; tmux send-keys -t "$2" Enter; wait $W"#;

        let result = self
            .run(
                &["bash", "-c", script, &timeout_seconds, &wait_channel, target],
                Some(ENTER_SUBMISSION_WAIT_TIMEOUT + Duration::from_secs(1)),
                target,
            )
            .await?;

        if result.is_success {
            tracing::debug!(target, "message submitted successfully");
            return Ok(());
        }

        match self.capture_pane(target).await {
            Some(content) => {
                tracing::error!(target, pane = %content, "send enter and wait timed out");
            }
            None => {
                tracing::error!(target, "send enter and wait timed out; pane capture failed");
            }
        }

        Err(TmuxSendError::new(
            target,
            format!(
                "Timeout waiting for message submission signal (waited {}s)",
                ENTER_SUBMISSION_WAIT_TIMEOUT.as_secs()
            ),
        ))
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
