// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fakes for fleet operation tests.
//!
//! The fake provider serves hosts backed by real temp directories and the
//! local connector, optionally dressed up as remote so code paths that
//! skip local hosts can be exercised. The stub agent variant keeps its
//! lifecycle and sent messages in files under the agent state dir, so no
//! tmux server is involved.

use async_trait::async_trait;
use mng_core::agent_data::CertifiedAgentData;
use mng_core::command::CommandResult;
use mng_core::config::MngConfig;
use mng_core::error::MngError;
use mng_core::host_data::CertifiedHostData;
use mng_core::id::HostId;
use mng_core::name::{HostName, ProviderInstanceName};
use mng_core::options::NewHostOptions;
use mng_core::state::{AgentLifecycleState, HostState};
use mng_providers::agent::{Agent, AgentRegistry};
use mng_providers::connector::{Connector, LocalConnector};
use mng_providers::host::OnlineHost;
use mng_providers::offline_host::OfflineHost;
use mng_providers::paths::HostPaths;
use mng_providers::provider::{HostHandle, Provider};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A local connector that claims to be remote.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteishConnector {
    inner: LocalConnector,
}

#[async_trait]
impl Connector for RemoteishConnector {
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, MngError> {
        self.inner.execute(command, timeout).await
    }

    async fn write_file(
        &self,
        path: &Path,
        contents: &str,
        mode: Option<u32>,
    ) -> Result<(), MngError> {
        self.inner.write_file(path, contents, mode).await
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, MngError> {
        self.inner.read_file(path).await
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, MngError> {
        self.inner.list_dir(path).await
    }

    async fn copy_dir_from_local(
        &self,
        local_src: &Path,
        remote_dst: &Path,
    ) -> Result<(), MngError> {
        self.inner.copy_dir_from_local(local_src, remote_dst).await
    }

    async fn copy_file_from_local(
        &self,
        local_src: &Path,
        remote_dst: &Path,
    ) -> Result<(), MngError> {
        self.inner.copy_file_from_local(local_src, remote_dst).await
    }

    fn is_local(&self) -> bool {
        false
    }
}

/// Build a fake host over a temp dir, with initialized certified data.
pub async fn make_fake_host(
    root: &Path,
    name: &str,
    provider_name: &str,
    remoteish: bool,
    state: HostState,
) -> OnlineHost {
    let connector: Arc<dyn Connector> = if remoteish {
        Arc::new(RemoteishConnector::default())
    } else {
        Arc::new(LocalConnector::new())
    };

    let host = OnlineHost::new(
        HostId::generate(),
        HostName::new(name),
        ProviderInstanceName::new(provider_name),
        HostPaths::new(root),
        connector,
        MngConfig::new(root),
        None,
    );

    let mut data = CertifiedHostData::new(host.id().clone(), HostName::new(name));
    data.state = state;
    host.set_certified_data(&data).await.unwrap();
    host
}

/// Records lifecycle calls made against the fake provider.
#[derive(Default)]
pub struct ProviderCalls {
    pub stopped: Vec<HostId>,
    pub destroyed: Vec<HostId>,
    pub started: Vec<HostId>,
}

/// A provider over a fixed set of fake hosts.
pub struct FakeProvider {
    pub name: ProviderInstanceName,
    pub hosts: Vec<OnlineHost>,
    /// Hosts listed as offline handles instead of online ones.
    pub offline_ids: Mutex<HashSet<HostId>>,
    pub calls: Arc<Mutex<ProviderCalls>>,
    /// When set, stop_host fails with this message.
    pub stop_error: Option<String>,
}

impl FakeProvider {
    pub fn new(hosts: Vec<OnlineHost>) -> Self {
        Self {
            name: ProviderInstanceName::new("fake"),
            hosts,
            offline_ids: Mutex::new(HashSet::new()),
            calls: Arc::new(Mutex::new(ProviderCalls::default())),
            stop_error: None,
        }
    }

    pub fn mark_offline(&self, host_id: &HostId) {
        self.offline_ids.lock().insert(host_id.clone());
    }

    fn find(&self, query: &str) -> Option<&OnlineHost> {
        self.hosts
            .iter()
            .find(|h| h.id().as_str() == query || h.name().as_str() == query)
    }

    async fn handle_for(&self, host: &OnlineHost) -> Result<HostHandle, MngError> {
        if self.offline_ids.lock().contains(host.id()) {
            let data = host.get_certified_data().await?;
            let records = host.list_agent_records().await?;
            Ok(HostHandle::Offline(OfflineHost::new(
                self.name.clone(),
                data,
                records,
            )))
        } else {
            Ok(HostHandle::Online(host.clone()))
        }
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &ProviderInstanceName {
        &self.name
    }

    fn supports_shutdown_hosts(&self) -> bool {
        true
    }

    async fn create_host(&self, _options: NewHostOptions) -> Result<OnlineHost, MngError> {
        Err(MngError::OperationNotSupported(
            "fake provider has a fixed host set".to_string(),
        ))
    }

    async fn start_host(
        &self,
        host_id: &HostId,
        _snapshot: Option<&mng_core::id::SnapshotId>,
    ) -> Result<OnlineHost, MngError> {
        let host = self
            .find(host_id.as_str())
            .ok_or_else(|| MngError::HostNotFound(host_id.to_string()))?;
        self.offline_ids.lock().remove(host_id);
        self.calls.lock().started.push(host_id.clone());
        Ok(host.clone())
    }

    async fn stop_host(&self, host_id: &HostId, _create_snapshot: bool) -> Result<(), MngError> {
        if let Some(error) = &self.stop_error {
            return Err(MngError::CommandFailed(error.clone()));
        }
        self.calls.lock().stopped.push(host_id.clone());
        Ok(())
    }

    async fn destroy_host(&self, host_id: &HostId) -> Result<(), MngError> {
        self.calls.lock().destroyed.push(host_id.clone());
        Ok(())
    }

    async fn get_host(&self, query: &str) -> Result<HostHandle, MngError> {
        let host = self
            .find(query)
            .ok_or_else(|| MngError::HostNotFound(query.to_string()))?;
        self.handle_for(host).await
    }

    async fn list_hosts(&self, _include_destroyed: bool) -> Result<Vec<HostHandle>, MngError> {
        let mut handles = Vec::new();
        for host in &self.hosts {
            handles.push(self.handle_for(host).await?);
        }
        Ok(handles)
    }

    async fn list_persisted_agent_data_for_host(
        &self,
        host_id: &HostId,
    ) -> Result<Vec<serde_json::Value>, MngError> {
        let host = self
            .find(host_id.as_str())
            .ok_or_else(|| MngError::HostNotFound(host_id.to_string()))?;
        host.list_agent_records().await
    }

    async fn get_host_tags(
        &self,
        _host_id: &HostId,
    ) -> Result<BTreeMap<String, String>, MngError> {
        Ok(BTreeMap::new())
    }

    async fn set_host_tags(
        &self,
        _host_id: &HostId,
        _tags: BTreeMap<String, String>,
    ) -> Result<(), MngError> {
        Ok(())
    }
}

/// Agent variant for tests: lifecycle and deliveries live in files.
pub struct StubAgent {
    data: CertifiedAgentData,
}

impl StubAgent {
    fn state_file(&self, host: &OnlineHost) -> std::path::PathBuf {
        host.paths().agent_dir(&self.data.id).join("stub_state")
    }

    fn sent_file(&self, host: &OnlineHost) -> std::path::PathBuf {
        host.paths().agent_dir(&self.data.id).join("sent.log")
    }

    /// Messages delivered to this agent, in order.
    pub async fn sent_messages(host: &OnlineHost, data: &CertifiedAgentData) -> Vec<String> {
        let path = host.paths().agent_dir(&data.id).join("sent.log");
        host.connector()
            .read_file(&path)
            .await
            .ok()
            .flatten()
            .map(|content| content.lines().map(|l| l.to_string()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn data(&self) -> &CertifiedAgentData {
        &self.data
    }

    async fn start(&self, host: &OnlineHost) -> Result<(), MngError> {
        host.write_text_file(&self.state_file(host), "RUNNING").await
    }

    async fn stop(&self, host: &OnlineHost) -> Result<(), MngError> {
        host.write_text_file(&self.state_file(host), "STOPPED").await
    }

    async fn send_message(&self, host: &OnlineHost, content: &str) -> Result<(), MngError> {
        if self.data.extra.get("fail_send").is_some() {
            return Err(MngError::SendMessage {
                agent: self.data.name.clone(),
                reason: "stub send failure".to_string(),
            });
        }
        let existing = host
            .connector()
            .read_file(&self.sent_file(host))
            .await?
            .unwrap_or_default();
        host.write_text_file(&self.sent_file(host), &format!("{}{}\n", existing, content))
            .await
    }

    async fn get_lifecycle_state(
        &self,
        host: &OnlineHost,
    ) -> Result<AgentLifecycleState, MngError> {
        let from_file = host.connector().read_file(&self.state_file(host)).await?;
        let raw = from_file.unwrap_or_else(|| {
            self.data
                .extra
                .get("lifecycle")
                .and_then(|v| v.as_str())
                .unwrap_or("RUNNING")
                .to_string()
        });
        match raw.trim() {
            "STOPPED" => Ok(AgentLifecycleState::Stopped),
            "WAITING" => Ok(AgentLifecycleState::Waiting),
            "REPLACED" => Ok(AgentLifecycleState::Replaced),
            _ => Ok(AgentLifecycleState::Running),
        }
    }

    async fn capture_pane_content(&self, _host: &OnlineHost) -> Option<String> {
        None
    }

    fn get_resume_message(&self) -> Option<String> {
        self.data
            .extra
            .get("resume_message")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    fn get_ready_timeout_seconds(&self) -> f64 {
        2.0
    }
}

/// Registry with the stub variant installed as type `stub`.
pub fn stub_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::empty();
    registry.register("stub", Arc::new(|data| Arc::new(StubAgent { data })));
    registry
}

/// Create a stub agent record on a host.
pub async fn add_stub_agent(
    host: &OnlineHost,
    name: &str,
    lifecycle: &str,
    extra: &[(&str, &str)],
) -> CertifiedAgentData {
    let mut data = CertifiedAgentData::new(
        mng_core::id::AgentId::generate(),
        mng_core::name::AgentName::new(name),
        "stub",
        "stub-command",
        "/tmp",
        host.id().clone(),
    );
    data.extra.insert(
        "lifecycle".to_string(),
        serde_json::Value::String(lifecycle.to_string()),
    );
    for (key, value) in extra {
        data.extra.insert(
            key.to_string(),
            serde_json::Value::String(value.to_string()),
        );
    }
    host.create_agent_state(&data, "").await.unwrap();
    data
}
