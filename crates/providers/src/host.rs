// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Online host: a reachable execution environment.
//!
//! The host owns its state directory (`data.json`, `agents/`, `commands/`,
//! `logs/`) and exposes the command-runner contract everything else builds
//! on. All file access goes through the host's connector so local and
//! SSH-reached hosts behave identically. `data.json` is the durable source
//! of truth; writes are atomic and notify the owning provider.

use crate::connector::Connector;
use crate::paths::HostPaths;
use async_trait::async_trait;
use mng_adapters::runner::{CommandRunner, RunnerError, RunnerOutput};
use mng_core::command::CommandResult;
use mng_core::config::MngConfig;
use mng_core::error::MngError;
use mng_core::host_data::CertifiedHostData;
use mng_core::id::{AgentId, HostId};
use mng_core::name::{HostName, ProviderInstanceName};
use mng_core::reference::AgentReference;
use mng_core::state::HostState;
use mng_core::ActivityConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked whenever certified host data is rewritten.
pub type HostDataCallback = Arc<dyn Fn(&HostId, &CertifiedHostData) + Send + Sync>;

/// A host the control plane can currently reach.
#[derive(Clone)]
pub struct OnlineHost {
    id: HostId,
    name: HostName,
    provider_name: ProviderInstanceName,
    paths: HostPaths,
    connector: Arc<dyn Connector>,
    config: MngConfig,
    on_updated: Option<HostDataCallback>,
}

impl OnlineHost {
    pub fn new(
        id: HostId,
        name: HostName,
        provider_name: ProviderInstanceName,
        paths: HostPaths,
        connector: Arc<dyn Connector>,
        config: MngConfig,
        on_updated: Option<HostDataCallback>,
    ) -> Self {
        Self {
            id,
            name,
            provider_name,
            paths,
            connector,
            config,
            on_updated,
        }
    }

    pub fn id(&self) -> &HostId {
        &self.id
    }

    pub fn name(&self) -> &HostName {
        &self.name
    }

    pub fn provider_name(&self) -> &ProviderInstanceName {
        &self.provider_name
    }

    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    pub fn config(&self) -> &MngConfig {
        &self.config
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn is_local(&self) -> bool {
        self.connector.is_local()
    }

    // =========================================================================
    // Command runner contract
    // =========================================================================

    pub async fn execute_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, MngError> {
        self.connector.execute(command, timeout).await
    }

    pub async fn write_file(
        &self,
        path: &Path,
        contents: &str,
        mode: Option<u32>,
    ) -> Result<(), MngError> {
        self.connector.write_file(path, contents, mode).await
    }

    pub async fn write_text_file(&self, path: &Path, contents: &str) -> Result<(), MngError> {
        self.write_file(path, contents, None).await
    }

    // =========================================================================
    // Certified data
    // =========================================================================

    pub async fn get_certified_data(&self) -> Result<CertifiedHostData, MngError> {
        let data_path = self.paths.data_file();
        let raw = self
            .connector
            .read_file(&data_path)
            .await?
            .ok_or_else(|| MngError::HostDataSchema {
                path: data_path.clone(),
                detail: "file is missing".to_string(),
            })?;

        let data: CertifiedHostData =
            serde_json::from_str(&raw).map_err(|e| MngError::HostDataSchema {
                path: data_path.clone(),
                detail: e.to_string(),
            })?;
        data.warn_unknown_keys(&data_path);
        Ok(data)
    }

    /// Atomically rewrite `data.json` and notify the provider.
    pub async fn set_certified_data(&self, data: &CertifiedHostData) -> Result<(), MngError> {
        let serialized = serde_json::to_string_pretty(data).map_err(|e| MngError::Other(
            format!("failed to serialize host data: {}", e),
        ))?;
        self.connector
            .write_file(&self.paths.data_file(), &serialized, None)
            .await?;
        if let Some(callback) = &self.on_updated {
            callback(&self.id, data);
        }
        Ok(())
    }

    pub async fn get_state(&self) -> Result<HostState, MngError> {
        Ok(self.get_certified_data().await?.state)
    }

    pub async fn get_activity_config(&self) -> Result<ActivityConfig, MngError> {
        Ok(self.get_certified_data().await?.activity_config())
    }

    /// Save activity configuration into `data.json`, where the in-host
    /// activity watcher reads it.
    pub async fn set_activity_config(&self, config: &ActivityConfig) -> Result<(), MngError> {
        tracing::debug!(
            host_id = %self.id,
            idle_mode = %config.idle_mode,
            idle_timeout_seconds = config.idle_timeout_seconds,
            "setting activity config"
        );
        let mut data = self.get_certified_data().await?;
        data.set_activity_config(config);
        self.set_certified_data(&data).await
    }

    pub async fn get_plugin_data(
        &self,
        plugin_name: &str,
    ) -> Result<Option<serde_json::Value>, MngError> {
        Ok(self
            .get_certified_data()
            .await?
            .plugin
            .get(plugin_name)
            .cloned())
    }

    /// Record a generated work dir so cleanup can recover it later.
    pub async fn track_generated_work_dir(&self, work_dir: &Path) -> Result<(), MngError> {
        let mut data = self.get_certified_data().await?;
        let entry = work_dir.display().to_string();
        if !data.generated_work_dirs.contains(&entry) {
            data.generated_work_dirs.push(entry);
            self.set_certified_data(&data).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Tags (client-side, for providers that keep them in tags.json)
    // =========================================================================

    pub async fn get_tags(&self) -> Result<std::collections::BTreeMap<String, String>, MngError> {
        let raw = self.connector.read_file(&self.paths.tags_file()).await?;
        match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| MngError::HostDataSchema {
                path: self.paths.tags_file(),
                detail: e.to_string(),
            }),
            None => Ok(Default::default()),
        }
    }

    pub async fn set_tags(
        &self,
        tags: &std::collections::BTreeMap<String, String>,
    ) -> Result<(), MngError> {
        let serialized = serde_json::to_string_pretty(tags)
            .map_err(|e| MngError::Other(format!("failed to serialize tags: {}", e)))?;
        self.connector
            .write_file(&self.paths.tags_file(), &serialized, None)
            .await
    }

    // =========================================================================
    // Uptime and idleness
    // =========================================================================

    pub async fn get_uptime_seconds(&self) -> Result<f64, MngError> {
        let result = self
            .execute_command("awk '{print $1}' /proc/uptime", Some(Duration::from_secs(10)))
            .await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "reading uptime failed: {}",
                result.stderr.trim()
            )));
        }
        result
            .stdout
            .trim()
            .parse::<f64>()
            .map_err(|e| MngError::CommandFailed(format!("unparsable uptime: {}", e)))
    }

    /// Seconds since the most recent activity-source file was touched.
    ///
    /// Falls back to uptime when no activity file exists yet.
    pub async fn get_idle_seconds(&self) -> Result<f64, MngError> {
        let config = self.get_activity_config().await?;
        let files: Vec<String> = config
            .activity_sources
            .iter()
            .map(|s| {
                format!(
                    "'{}'",
                    crate::connector::shell_escape_single_quotes(
                        &self.paths.activity_file(*s).display().to_string()
                    )
                )
            })
            .collect();

        if !files.is_empty() {
            let command = format!(
                "LAST=$(stat -c %Y {} 2>/dev/null | sort -n | tail -1); \
                 if [ -n \"$LAST\" ]; then echo $(( $(date +%s) - LAST )); fi",
                files.join(" ")
            );
            let result = self
                .execute_command(&command, Some(Duration::from_secs(10)))
                .await?;
            let trimmed = result.stdout.trim();
            if result.success && !trimmed.is_empty() {
                return trimmed
                    .parse::<f64>()
                    .map_err(|e| MngError::CommandFailed(format!("unparsable idle time: {}", e)));
            }
        }

        self.get_uptime_seconds().await
    }

    /// Touch an activity-source file to mark the host active now.
    pub async fn record_activity(
        &self,
        source: mng_core::state::ActivitySource,
    ) -> Result<(), MngError> {
        let path = self.paths.activity_file(source);
        let command = format!(
            "mkdir -p \"$(dirname '{p}')\" && touch '{p}'",
            p = crate::connector::shell_escape_single_quotes(&path.display().to_string())
        );
        let result = self.execute_command(&command, Some(Duration::from_secs(10))).await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "recording activity failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Agents
    // =========================================================================

    /// List raw persisted agent records (`agents/<id>/data.json` contents).
    pub async fn list_agent_records(&self) -> Result<Vec<serde_json::Value>, MngError> {
        let mut records = Vec::new();
        for entry in self.connector.list_dir(&self.paths.agents_dir()).await? {
            let agent_id = AgentId::new(entry.as_str());
            let data_path = self.paths.agent_data_file(&agent_id);
            match self.connector.read_file(&data_path).await? {
                Some(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
                    Ok(value) => records.push(value),
                    Err(e) => {
                        tracing::warn!(
                            host_id = %self.id,
                            path = %data_path.display(),
                            error = %e,
                            "skipping unreadable agent data file"
                        );
                    }
                },
                None => {
                    tracing::warn!(
                        host_id = %self.id,
                        path = %data_path.display(),
                        "agent state dir has no data.json, skipping"
                    );
                }
            }
        }
        Ok(records)
    }

    /// Validated references for every agent on this host.
    ///
    /// Malformed records are skipped with a warning, never a crash.
    pub async fn get_agent_references(&self) -> Result<Vec<AgentReference>, MngError> {
        let records = self.list_agent_records().await?;
        Ok(records
            .iter()
            .filter_map(|record| {
                AgentReference::from_record(&self.id, &self.provider_name, record)
            })
            .collect())
    }

    /// Create the state directory for a new agent.
    pub async fn create_agent_state(
        &self,
        data: &mng_core::agent_data::CertifiedAgentData,
        env_file_contents: &str,
    ) -> Result<(), MngError> {
        let serialized = serde_json::to_string_pretty(data)
            .map_err(|e| MngError::Other(format!("failed to serialize agent data: {}", e)))?;
        self.connector
            .write_file(&self.paths.agent_data_file(&data.id), &serialized, None)
            .await?;
        self.connector
            .write_file(&self.paths.agent_env_file(&data.id), env_file_contents, None)
            .await?;

        let logs_dir = self.paths.agent_logs_dir(&data.id);
        let command = format!(
            "mkdir -p '{}'",
            crate::connector::shell_escape_single_quotes(&logs_dir.display().to_string())
        );
        let result = self.execute_command(&command, Some(Duration::from_secs(10))).await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "creating agent logs dir failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    /// Remove an agent's state directory entirely.
    pub async fn remove_agent_state_dir(&self, agent_id: &AgentId) -> Result<(), MngError> {
        let dir = self.paths.agent_dir(agent_id);
        let command = format!(
            "rm -rf '{}'",
            crate::connector::shell_escape_single_quotes(&dir.display().to_string())
        );
        let result = self.execute_command(&command, Some(Duration::from_secs(30))).await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "removing agent state dir failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Command runner that routes through a host's `execute_command`.
///
/// This is how the tmux protocol reaches panes on remote hosts: the same
/// protocol code runs, only the transport changes.
#[derive(Clone)]
pub struct HostCommandRunner {
    host: OnlineHost,
}

impl HostCommandRunner {
    pub fn new(host: OnlineHost) -> Self {
        Self { host }
    }
}

/// Quote argv elements for transport through `sh -c`.
fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            format!(
                "'{}'",
                crate::connector::shell_escape_single_quotes(arg)
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl CommandRunner for HostCommandRunner {
    async fn run(
        &self,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<RunnerOutput, RunnerError> {
        let command = shell_join(args);
        let result = self
            .host
            .execute_command(&command, timeout)
            .await
            .map_err(|e| RunnerError::Execution(e.to_string()))?;
        Ok(RunnerOutput {
            is_success: result.success,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
