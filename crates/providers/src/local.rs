// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reference provider: the local machine as a single always-on host.
//!
//! There is exactly one host, named `localhost`. Its id is generated once
//! and persisted in `<host_dir>/host_id` so every process and restart sees
//! the same host. The local machine cannot be stopped or destroyed through
//! the provider, and snapshots are unsupported; tags are kept client-side
//! in `tags.json`.

use crate::connector::LocalConnector;
use crate::host::{HostDataCallback, OnlineHost};
use crate::paths::HostPaths;
use crate::provider::{HostHandle, Provider};
use async_trait::async_trait;
use mng_core::config::MngConfig;
use mng_core::error::MngError;
use mng_core::host_data::CertifiedHostData;
use mng_core::id::{HostId, SnapshotId};
use mng_core::name::{HostName, ProviderInstanceName, LOCAL_PROVIDER_NAME};
use mng_core::options::NewHostOptions;
use mng_core::state::HostState;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The name of the single local host.
pub const LOCAL_HOST_NAME: &str = "localhost";

/// Provider instance for the local machine.
pub struct LocalProvider {
    name: ProviderInstanceName,
    config: MngConfig,
    paths: HostPaths,
    on_updated: Option<HostDataCallback>,
}

impl LocalProvider {
    pub fn new(config: MngConfig) -> Self {
        let paths = HostPaths::new(&config.host_dir);
        Self {
            name: ProviderInstanceName::new(LOCAL_PROVIDER_NAME),
            config,
            paths,
            on_updated: None,
        }
    }

    pub fn with_update_callback(mut self, callback: HostDataCallback) -> Self {
        self.on_updated = Some(callback);
        self
    }

    /// Load the persisted host id, generating and persisting one if absent.
    ///
    /// The id identifies the machine, so it lives directly under the host
    /// dir rather than in any per-profile location.
    async fn load_or_create_host_id(&self) -> Result<HostId, MngError> {
        let id_path = self.paths.host_id_file();
        match tokio::fs::read_to_string(&id_path).await {
            Ok(raw) => Ok(HostId::new(raw.trim())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let id = HostId::generate();
                if let Some(parent) = id_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| MngError::io(parent, e))?;
                }
                tokio::fs::write(&id_path, format!("{}\n", id))
                    .await
                    .map_err(|e| MngError::io(&id_path, e))?;
                Ok(id)
            }
            Err(e) => Err(MngError::io(&id_path, e)),
        }
    }

    /// Materialize the single local host, initializing state on first use.
    async fn localhost(&self) -> Result<OnlineHost, MngError> {
        let id = self.load_or_create_host_id().await?;
        let host = OnlineHost::new(
            id.clone(),
            HostName::new(LOCAL_HOST_NAME),
            self.name.clone(),
            self.paths.clone(),
            Arc::new(LocalConnector::new()),
            self.config.clone(),
            self.on_updated.clone(),
        );

        if !self.paths.data_file().exists() {
            let mut data = CertifiedHostData::new(id, HostName::new(LOCAL_HOST_NAME));
            // The local machine is by definition already up.
            data.state = HostState::Running;
            host.set_certified_data(&data).await?;
        }
        Ok(host)
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &ProviderInstanceName {
        &self.name
    }

    fn supports_mutable_tags(&self) -> bool {
        true
    }

    async fn create_host(&self, options: NewHostOptions) -> Result<OnlineHost, MngError> {
        // There is only ever the one host; creation is idempotent and any
        // requested name is ignored in favor of the canonical one.
        let host = self.localhost().await?;
        if let Some(activity) = &options.activity {
            host.set_activity_config(activity).await?;
        }
        Ok(host)
    }

    async fn start_host(
        &self,
        host_id: &HostId,
        _snapshot: Option<&SnapshotId>,
    ) -> Result<OnlineHost, MngError> {
        let host = self.localhost().await?;
        if host.id() != host_id {
            return Err(MngError::HostNotFound(host_id.to_string()));
        }
        Ok(host)
    }

    async fn stop_host(&self, _host_id: &HostId, _create_snapshot: bool) -> Result<(), MngError> {
        Err(MngError::LocalHostNotStoppable)
    }

    async fn destroy_host(&self, _host_id: &HostId) -> Result<(), MngError> {
        Err(MngError::LocalHostNotDestroyable)
    }

    async fn get_host(&self, query: &str) -> Result<HostHandle, MngError> {
        let host = self.localhost().await?;
        if host.id().as_str() == query || host.name().as_str() == query {
            Ok(HostHandle::Online(host))
        } else {
            Err(MngError::HostNotFound(query.to_string()))
        }
    }

    async fn list_hosts(&self, _include_destroyed: bool) -> Result<Vec<HostHandle>, MngError> {
        Ok(vec![HostHandle::Online(self.localhost().await?)])
    }

    async fn list_persisted_agent_data_for_host(
        &self,
        host_id: &HostId,
    ) -> Result<Vec<serde_json::Value>, MngError> {
        let host = self.localhost().await?;
        if host.id() != host_id {
            return Err(MngError::HostNotFound(host_id.to_string()));
        }
        host.list_agent_records().await
    }

    async fn get_host_tags(&self, host_id: &HostId) -> Result<BTreeMap<String, String>, MngError> {
        let host = self.localhost().await?;
        if host.id() != host_id {
            return Err(MngError::HostNotFound(host_id.to_string()));
        }
        host.get_tags().await
    }

    async fn set_host_tags(
        &self,
        host_id: &HostId,
        tags: BTreeMap<String, String>,
    ) -> Result<(), MngError> {
        let host = self.localhost().await?;
        if host.id() != host_id {
            return Err(MngError::HostNotFound(host_id.to_string()));
        }
        host.set_tags(&tags).await
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
