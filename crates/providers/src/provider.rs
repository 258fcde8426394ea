// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provider interface: a uniform control plane over host backends.
//!
//! Each configured provider instance manages hosts of one kind (local
//! machine, containers, cloud sandboxes). Callers depend only on this trait;
//! implementations register in a [`ProviderRegistry`] keyed by instance
//! name. Optional capabilities default to unsupported and return typed
//! errors rather than being left ambiguous.

use crate::host::OnlineHost;
use crate::offline_host::OfflineHost;
use async_trait::async_trait;
use mng_core::error::MngError;
use mng_core::id::{HostId, SnapshotId, VolumeId};
use mng_core::name::{HostName, ProviderInstanceName};
use mng_core::options::NewHostOptions;
use mng_core::resources::{SnapshotInfo, VolumeInfo};
use mng_core::state::HostState;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A host as returned by provider lookups: reachable or not.
#[derive(Clone)]
pub enum HostHandle {
    Online(OnlineHost),
    Offline(OfflineHost),
}

impl HostHandle {
    pub fn id(&self) -> &HostId {
        match self {
            HostHandle::Online(host) => host.id(),
            HostHandle::Offline(host) => host.id(),
        }
    }

    pub fn name(&self) -> &HostName {
        match self {
            HostHandle::Online(host) => host.name(),
            HostHandle::Offline(host) => host.name(),
        }
    }

    pub fn provider_name(&self) -> &ProviderInstanceName {
        match self {
            HostHandle::Online(host) => host.provider_name(),
            HostHandle::Offline(host) => host.provider_name(),
        }
    }

    pub async fn get_state(&self) -> Result<HostState, MngError> {
        match self {
            HostHandle::Online(host) => host.get_state().await,
            HostHandle::Offline(host) => Ok(host.get_state()),
        }
    }

    /// The online host, or a `HostOffline` error.
    pub fn online(&self) -> Result<&OnlineHost, MngError> {
        match self {
            HostHandle::Online(host) => Ok(host),
            HostHandle::Offline(host) => Err(MngError::HostOffline(host.id().to_string())),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, HostHandle::Online(_))
    }
}

/// One configured backend instance that can create and manage hosts.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &ProviderInstanceName;

    // Capabilities. Defaults are the least capable provider.
    fn supports_snapshots(&self) -> bool {
        false
    }
    fn supports_shutdown_hosts(&self) -> bool {
        false
    }
    fn supports_volumes(&self) -> bool {
        false
    }
    fn supports_mutable_tags(&self) -> bool {
        false
    }

    async fn create_host(&self, options: NewHostOptions) -> Result<OnlineHost, MngError>;

    async fn start_host(
        &self,
        host_id: &HostId,
        snapshot: Option<&SnapshotId>,
    ) -> Result<OnlineHost, MngError>;

    async fn stop_host(&self, host_id: &HostId, create_snapshot: bool) -> Result<(), MngError>;

    async fn destroy_host(&self, host_id: &HostId) -> Result<(), MngError>;

    /// Look up a host by id or name.
    async fn get_host(&self, query: &str) -> Result<HostHandle, MngError>;

    async fn list_hosts(&self, include_destroyed: bool) -> Result<Vec<HostHandle>, MngError>;

    /// Read-through to the host's persisted agent `data.json` records.
    async fn list_persisted_agent_data_for_host(
        &self,
        host_id: &HostId,
    ) -> Result<Vec<serde_json::Value>, MngError>;

    async fn create_snapshot(&self, _host_id: &HostId) -> Result<SnapshotInfo, MngError> {
        Err(MngError::SnapshotsNotSupported(self.name().clone()))
    }

    async fn list_snapshots(&self, _host_id: &HostId) -> Result<Vec<SnapshotInfo>, MngError> {
        Err(MngError::SnapshotsNotSupported(self.name().clone()))
    }

    async fn delete_snapshot(&self, _snapshot_id: &SnapshotId) -> Result<(), MngError> {
        Err(MngError::SnapshotsNotSupported(self.name().clone()))
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>, MngError> {
        Err(MngError::OperationNotSupported(format!(
            "volumes are not supported by provider {}",
            self.name()
        )))
    }

    async fn delete_volume(&self, _volume_id: &VolumeId) -> Result<(), MngError> {
        Err(MngError::OperationNotSupported(format!(
            "volumes are not supported by provider {}",
            self.name()
        )))
    }

    async fn get_host_tags(&self, host_id: &HostId) -> Result<BTreeMap<String, String>, MngError>;

    async fn set_host_tags(
        &self,
        host_id: &HostId,
        tags: BTreeMap<String, String>,
    ) -> Result<(), MngError>;

    /// Renaming is deliberately unsupported unless a provider opts in.
    async fn rename_host(&self, _host_id: &HostId, _name: &HostName) -> Result<(), MngError> {
        Err(MngError::OperationNotSupported(format!(
            "rename_host is not supported by provider {}",
            self.name()
        )))
    }
}

/// Name-keyed set of configured provider instances.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, MngError> {
        self.providers
            .iter()
            .find(|p| p.name().as_str() == name)
            .cloned()
            .ok_or_else(|| MngError::ProviderNotFound(ProviderInstanceName::new(name)))
    }

    pub fn all(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
