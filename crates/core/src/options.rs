// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Option structs for host and agent creation.
//!
//! Everywhere an operation needs a bag of settings, it takes one of these
//! explicit structs with named fields and explicit defaults.

use crate::activity::ActivityConfig;
use crate::id::SnapshotId;
use crate::name::{AgentName, HostName};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Options for creating a new host.
#[derive(Debug, Clone, Default)]
pub struct NewHostOptions {
    pub name: Option<HostName>,
    /// Base image reference, for providers that build images.
    pub image: Option<String>,
    pub tags: BTreeMap<String, String>,
    /// Provider-specific arguments applied while building the host.
    pub build_args: Vec<String>,
    /// Provider-specific arguments applied while starting the host.
    pub start_args: Vec<String>,
    pub activity: Option<ActivityConfig>,
    /// Extra `known_hosts` lines installed for outbound SSH from the host.
    pub known_hosts: Vec<String>,
    /// Snapshot to restore instead of a fresh boot.
    pub snapshot: Option<SnapshotId>,
    /// Mount path of a persistent volume on the host. The host state dir
    /// is symlinked onto it and a background sync loop keeps it coherent.
    pub volume_mount_path: Option<String>,
}

/// A single file upload: `local_path:remote_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub local_path: PathBuf,
    /// Relative paths are resolved against the agent's work dir.
    pub remote_path: PathBuf,
}

/// A single remote file modification: `remote_path:text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub remote_path: PathBuf,
    pub text: String,
}

/// Caller-supplied provisioning steps, applied between the before/after
/// provisioning hooks in the order the fields are declared here.
#[derive(Debug, Clone, Default)]
pub struct AgentProvisioningOptions {
    pub created_directories: Vec<PathBuf>,
    pub uploads: Vec<FileUpload>,
    pub prepends: Vec<FileEdit>,
    pub appends: Vec<FileEdit>,
    /// Commands run with sudo, in order.
    pub sudo_commands: Vec<String>,
    /// Commands run as the agent user, in order.
    pub user_commands: Vec<String>,
    pub env: EnvSpec,
}

/// Environment variable sources for an agent, merged in this order with
/// later sources overriding earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSpec {
    /// Variable names forwarded from the invoking shell.
    pub pass_env: Vec<String>,
    /// Literal `KEY=VALUE` pairs.
    pub literals: Vec<(String, String)>,
    /// Files of `KEY=VALUE` lines.
    pub env_files: Vec<PathBuf>,
}

/// Options for creating an agent on a (possibly new) host.
#[derive(Debug, Clone)]
pub struct CreateAgentOptions {
    pub name: Option<AgentName>,
    /// Selects the agent class; see the agent registry.
    pub agent_type: String,
    /// Shell command that starts the TUI process.
    pub command: String,
    /// Pre-existing work dir inside the host; generated when absent.
    pub work_dir: Option<PathBuf>,
    /// Local source directory copied into the work dir.
    pub source: Option<PathBuf>,
    /// Skip the initial file copy entirely.
    pub create_work_dir: bool,
    /// Message sent right after the agent is ready.
    pub initial_message: Option<String>,
    /// Block until the agent's session exists before returning.
    pub await_ready: bool,
    pub permissions: Vec<String>,
    pub provisioning: AgentProvisioningOptions,
}

impl Default for CreateAgentOptions {
    fn default() -> Self {
        Self {
            name: None,
            agent_type: "tui".to_string(),
            command: String::new(),
            work_dir: None,
            source: None,
            create_work_dir: true,
            initial_message: None,
            await_ready: false,
            permissions: Vec::new(),
            provisioning: AgentProvisioningOptions::default(),
        }
    }
}
