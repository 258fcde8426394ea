// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loading agent references across every configured provider.
//!
//! Listing works entirely from references (persisted data snapshots), so it
//! never needs to start or connect to a host beyond what the provider
//! already knows.

use mng_core::error::MngError;
use mng_core::reference::{AgentReference, HostReference};
use mng_providers::agent::AgentRegistry;
use mng_providers::provider::{HostHandle, ProviderRegistry};

/// Shared handles fleet operations need.
#[derive(Clone)]
pub struct FleetContext {
    pub providers: ProviderRegistry,
    pub agents: AgentRegistry,
}

impl FleetContext {
    pub fn new(providers: ProviderRegistry, agents: AgentRegistry) -> Self {
        Self { providers, agents }
    }
}

/// Load every agent reference from every provider, grouped by host.
///
/// Provider-level failures surface as errors; per-record validation
/// failures are already skipped (with warnings) at the host layer.
pub async fn load_all_agents_grouped_by_host(
    ctx: &FleetContext,
) -> Result<Vec<(HostReference, Vec<AgentReference>)>, MngError> {
    let mut grouped = Vec::new();

    for provider in ctx.providers.all() {
        let hosts = provider.list_hosts(false).await?;
        for handle in hosts {
            let host_reference = HostReference {
                host_id: handle.id().clone(),
                host_name: handle.name().clone(),
                provider_name: handle.provider_name().clone(),
            };
            let references = match &handle {
                HostHandle::Online(host) => host.get_agent_references().await?,
                HostHandle::Offline(host) => host.get_agent_references(),
            };
            grouped.push((host_reference, references));
        }
    }

    Ok(grouped)
}

#[cfg(test)]
#[path = "list_tests.rs"]
mod tests;
