// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Certified agent data: the durable `data.json` record for an agent.

use crate::id::{AgentId, HostId};
use crate::name::AgentName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Certified data stored in `<host_dir>/agents/<agent_id>/data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertifiedAgentData {
    pub id: AgentId,
    pub name: AgentName,
    /// Selects the agent class and default configuration.
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Shell command that starts the TUI process.
    pub command: String,
    /// Absolute path of the agent's working directory inside the host.
    pub work_dir: String,
    pub host_id: HostId,
    pub create_time: DateTime<Utc>,
    /// Free-form tags used by callers to filter agents.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Keys this version does not understand. Preserved on rewrite.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CertifiedAgentData {
    pub fn new(
        id: AgentId,
        name: AgentName,
        agent_type: impl Into<String>,
        command: impl Into<String>,
        work_dir: impl Into<String>,
        host_id: HostId,
    ) -> Self {
        Self {
            id,
            name,
            agent_type: agent_type.into(),
            command: command.into(),
            work_dir: work_dir.into(),
            host_id,
            create_time: Utc::now(),
            permissions: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
#[path = "agent_data_tests.rs"]
mod tests;
