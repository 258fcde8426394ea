// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration shared across subsystems.
//!
//! Full config-file discovery lives in the CLI layer; the core only needs
//! the handful of knobs below, with defaults that match production.

use std::path::PathBuf;

/// The default terminal session prefix.
///
/// Session names are `<prefix><agent_name>`. Tests override the prefix to
/// get an isolated namespace on a shared tmux server.
pub const DEFAULT_SESSION_PREFIX: &str = "mng-";

/// Name of the CLI binary that external collaborators (like the forwarding
/// server's backend resolver) shell out to.
pub const DEFAULT_CLI_BINARY: &str = "mng";

/// Core runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MngConfig {
    /// Root of the local state tree (`data.json`, `agents/`, `commands/`, ...).
    pub host_dir: PathBuf,
    /// Terminal session prefix, used as a test-isolation namespace.
    pub session_prefix: String,
}

impl MngConfig {
    pub fn new(host_dir: impl Into<PathBuf>) -> Self {
        Self {
            host_dir: host_dir.into(),
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
        }
    }

    pub fn with_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    /// The session name for an agent under this configuration.
    pub fn session_name(&self, agent_name: &str) -> String {
        format!("{}{}", self.session_prefix, agent_name)
    }
}
