// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host state directory layout.
//!
//! ```text
//! <host_dir>/
//!   host_id                 deterministic id for the local host
//!   data.json               certified host data
//!   tags.json               client-side tags, where the provider keeps them
//!   agents/<agent_id>/      one state dir per agent
//!     data.json
//!     env
//!     logs/
//!   commands/               scripts pushed to the host
//!   logs/                   host-scope logs
//!   activity/               mtime files for idle detection
//!   work/                   generated agent work dirs
//! ```

use mng_core::id::AgentId;
use mng_core::state::ActivitySource;
use std::path::{Path, PathBuf};

/// Path helpers over a host state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    root: PathBuf,
}

impl HostPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn host_id_file(&self) -> PathBuf {
        self.root.join("host_id")
    }

    pub fn data_file(&self) -> PathBuf {
        self.root.join("data.json")
    }

    pub fn tags_file(&self) -> PathBuf {
        self.root.join("tags.json")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root.join("agents")
    }

    pub fn agent_dir(&self, agent_id: &AgentId) -> PathBuf {
        self.agents_dir().join(agent_id.as_str())
    }

    pub fn agent_data_file(&self, agent_id: &AgentId) -> PathBuf {
        self.agent_dir(agent_id).join("data.json")
    }

    pub fn agent_env_file(&self, agent_id: &AgentId) -> PathBuf {
        self.agent_dir(agent_id).join("env")
    }

    pub fn agent_logs_dir(&self, agent_id: &AgentId) -> PathBuf {
        self.agent_dir(agent_id).join("logs")
    }

    /// The sentinel file whose presence marks the agent as actively working.
    pub fn agent_active_file(&self, agent_id: &AgentId) -> PathBuf {
        self.agent_dir(agent_id).join("active")
    }

    pub fn commands_dir(&self) -> PathBuf {
        self.root.join("commands")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn activity_file(&self, source: ActivitySource) -> PathBuf {
        self.root.join(source.activity_file())
    }

    /// Where generated work dirs live for agents without a user-supplied one.
    pub fn work_dir_for(&self, agent_name: &str) -> PathBuf {
        self.root.join("work").join(agent_name)
    }
}
