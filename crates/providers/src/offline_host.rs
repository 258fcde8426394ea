// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline host: a read-only view of a host the provider still knows about.
//!
//! Built from persisted `data.json` plus provider metadata. Information
//! reads work; anything that would execute on the host fails with
//! `HostOffline`. A host becomes offline when it is STOPPED, PAUSED, or
//! CRASHED but has not been destroyed.

use mng_core::error::MngError;
use mng_core::host_data::CertifiedHostData;
use mng_core::id::HostId;
use mng_core::name::{HostName, ProviderInstanceName};
use mng_core::reference::AgentReference;
use mng_core::state::{HostState, StopReason};
use mng_core::ActivityConfig;

/// A host that cannot currently be reached.
#[derive(Debug, Clone)]
pub struct OfflineHost {
    provider_name: ProviderInstanceName,
    data: CertifiedHostData,
    /// Persisted agent records captured at listing time.
    agent_records: Vec<serde_json::Value>,
}

impl OfflineHost {
    pub fn new(
        provider_name: ProviderInstanceName,
        data: CertifiedHostData,
        agent_records: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            provider_name,
            data,
            agent_records,
        }
    }

    pub fn id(&self) -> &HostId {
        &self.data.id
    }

    pub fn name(&self) -> &HostName {
        &self.data.name
    }

    pub fn provider_name(&self) -> &ProviderInstanceName {
        &self.provider_name
    }

    pub fn get_state(&self) -> HostState {
        self.data.state
    }

    pub fn get_stop_reason(&self) -> Option<StopReason> {
        self.data.stop_reason
    }

    pub fn get_certified_data(&self) -> &CertifiedHostData {
        &self.data
    }

    pub fn get_activity_config(&self) -> ActivityConfig {
        self.data.activity_config()
    }

    /// References for agents persisted on this host, from provider data.
    pub fn get_agent_references(&self) -> Vec<AgentReference> {
        self.agent_records
            .iter()
            .filter_map(|record| {
                AgentReference::from_record(&self.data.id, &self.provider_name, record)
            })
            .collect()
    }

    /// Execute operations are not available offline.
    pub fn execute_command(&self, _command: &str) -> Result<mng_core::CommandResult, MngError> {
        Err(MngError::HostOffline(self.data.id.to_string()))
    }
}
