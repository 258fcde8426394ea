// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lightweight host and agent handles.
//!
//! References carry enough information to list and filter without opening a
//! connection to the host. Operations that need to act (send, exec, destroy)
//! materialize the online host from its provider first.

use crate::id::{AgentId, HostId};
use crate::name::{AgentName, HostName, ProviderInstanceName};
use serde::{Deserialize, Serialize};

/// A lightweight handle to a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostReference {
    pub host_id: HostId,
    pub host_name: HostName,
    pub provider_name: ProviderInstanceName,
}

/// A lightweight handle to an agent, with a snapshot of its certified data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReference {
    pub agent_id: AgentId,
    pub agent_name: AgentName,
    pub host_id: HostId,
    pub provider_name: ProviderInstanceName,
    /// The full agent `data.json` contents at the time of listing.
    pub certified_data: serde_json::Value,
}

impl AgentReference {
    /// Validate a raw agent record and build a reference from it.
    ///
    /// Records with a missing or ill-formed `id` or `name` are skipped with
    /// a warning; a malformed record must never crash a listing.
    pub fn from_record(
        host_id: &HostId,
        provider_name: &ProviderInstanceName,
        record: &serde_json::Value,
    ) -> Option<AgentReference> {
        let agent_id = match record.get("id").and_then(|v| v.as_str()) {
            Some(raw) => {
                let id = AgentId::new(raw);
                if !id.is_well_formed() {
                    tracing::warn!(
                        host_id = %host_id,
                        record = %record,
                        "skipping malformed agent record: invalid 'id'"
                    );
                    return None;
                }
                id
            }
            None => {
                tracing::warn!(
                    host_id = %host_id,
                    record = %record,
                    "skipping malformed agent record: missing 'id'"
                );
                return None;
            }
        };

        let agent_name = match record.get("name").and_then(|v| v.as_str()) {
            Some(raw) if !raw.is_empty() => AgentName::new(raw),
            _ => {
                tracing::warn!(
                    host_id = %host_id,
                    record = %record,
                    "skipping malformed agent record: missing 'name'"
                );
                return None;
            }
        };

        Some(AgentReference {
            agent_id,
            agent_name,
            host_id: host_id.clone(),
            provider_name: provider_name.clone(),
            certified_data: record.clone(),
        })
    }
}

#[cfg(test)]
#[path = "reference_tests.rs"]
mod tests;
