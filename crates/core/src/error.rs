// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared across the fleet manager.
//!
//! Errors fall into three families: user errors (bad input, unknown names;
//! exit code 2), operational errors (connectivity, timeouts, partial fleet
//! failures; exit code 1), and schema/internal errors (invalid data files,
//! unexpected plugin failures). User-facing variants carry a
//! [`MngError::user_help_text`] remedy.

use crate::id::{AgentId, HostId};
use crate::name::{AgentName, ProviderInstanceName};
use std::path::PathBuf;
use thiserror::Error;

/// Which family an error belongs to, for exit codes and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFamily {
    /// Bad flags, unknown names, reserved collisions. Exit code 2.
    User,
    /// Connectivity, timeouts, remote failures. Exit code 1.
    Operational,
    /// Data files that fail validation, unexpected internal failures.
    Schema,
}

/// Errors raised by fleet-manager operations.
#[derive(Debug, Error)]
pub enum MngError {
    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {agent_id} not found on host {host_id}")]
    AgentNotFoundOnHost { agent_id: AgentId, host_id: HostId },

    #[error("Provider {0} not found")]
    ProviderNotFound(ProviderInstanceName),

    #[error("Provider '{0}' is not authorized")]
    ProviderNotAuthorized(ProviderInstanceName),

    #[error("Name already in use: {0}")]
    NameInUse(String),

    #[error("Invalid filter expression '{expr}': {reason}")]
    InvalidFilter { expr: String, reason: String },

    #[error("Host '{0}' is offline")]
    HostOffline(String),

    #[error("Command timed out after {timeout_seconds:.0}s")]
    CommandTimeout { timeout_seconds: f64 },

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Failed to send message to agent {agent}: {reason}")]
    SendMessage { agent: AgentName, reason: String },

    #[error("Failed to start agent {agent}: {reason}")]
    AgentStart { agent: AgentName, reason: String },

    #[error("The local host cannot be stopped")]
    LocalHostNotStoppable,

    #[error("The local host cannot be destroyed")]
    LocalHostNotDestroyable,

    #[error("Snapshots are not supported by provider {0}")]
    SnapshotsNotSupported(ProviderInstanceName),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("Host data file has incompatible schema: {path}: {detail}")]
    HostDataSchema { path: PathBuf, detail: String },

    #[error("Agent data file has incompatible schema: {path}: {detail}")]
    AgentDataSchema { path: PathBuf, detail: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl MngError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MngError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn family(&self) -> ErrorFamily {
        match self {
            MngError::HostNotFound(_)
            | MngError::AgentNotFound(_)
            | MngError::ProviderNotFound(_)
            | MngError::NameInUse(_)
            | MngError::InvalidFilter { .. }
            | MngError::LocalHostNotStoppable
            | MngError::LocalHostNotDestroyable
            | MngError::SnapshotsNotSupported(_)
            | MngError::OperationNotSupported(_) => ErrorFamily::User,

            MngError::HostDataSchema { .. }
            | MngError::AgentDataSchema { .. }
            | MngError::Other(_) => ErrorFamily::Schema,

            _ => ErrorFamily::Operational,
        }
    }

    /// Exit code for CLI front-ends: 2 for usage errors, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.family() {
            ErrorFamily::User => 2,
            _ => 1,
        }
    }

    /// Additional context helping the user resolve the error, where defined.
    pub fn user_help_text(&self) -> Option<String> {
        match self {
            MngError::HostNotFound(_) | MngError::AgentNotFound(_) => {
                Some("Use 'mng list' to see available hosts and agents.".to_string())
            }
            MngError::AgentNotFoundOnHost { .. } => {
                Some("Use 'mng list' to see all agents and their host assignments.".to_string())
            }
            MngError::ProviderNotFound(_) => Some(
                "Check your configuration for available providers. \
                 Built-in providers include 'local'."
                    .to_string(),
            ),
            MngError::ProviderNotAuthorized(name) => Some(format!(
                "To disable this provider, set providers.{}.is_enabled to false in your config.",
                name
            )),
            MngError::HostDataSchema { path, .. } | MngError::AgentDataSchema { path, .. } => {
                Some(format!(
                    "This usually means the data format changed across an upgrade. \
                     Delete the file ({}) or migrate it to the new schema.",
                    path.display()
                ))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
