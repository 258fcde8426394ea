// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend discovery: which URL serves each agent's HTTP servers, and how
//! to reach the agent's host.
//!
//! Agents announce their servers by appending lines to `servers.jsonl`
//! (`{"server": "web", "url": "http://127.0.0.1:9100"}`). The production
//! resolver shells out to the fleet CLI to read those logs and to list
//! agents (which carries per-host SSH info for remote ones). Results are
//! cached with a short TTL; a failed refresh never overwrites a previously
//! cached value.

use async_trait::async_trait;
use mng_adapters::subprocess::{run_with_timeout, CLI_TIMEOUT};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// File agents append server announcements to.
pub const SERVERS_LOG_FILENAME: &str = "servers.jsonl";

/// How long resolver results stay fresh.
const CACHE_TTL: Duration = Duration::from_secs(5);

/// SSH connection info for a remote agent host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSshInfo {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub key_path: PathBuf,
}

/// One line of `servers.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ServerLogRecord {
    server: String,
    url: String,
}

/// Parse JSONL server records, skipping invalid lines with a warning.
/// Later records for the same server override earlier ones.
fn parse_server_log(text: &str) -> HashMap<String, String> {
    let mut servers = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ServerLogRecord>(line) {
            Ok(record) => {
                servers.insert(record.server, record.url);
            }
            Err(e) => {
                tracing::warn!(error = %e, line, "skipping invalid server log record");
            }
        }
    }
    servers
}

#[derive(Debug, Clone, Default)]
struct ParsedAgents {
    agent_ids: Vec<String>,
    /// SSH info keyed by agent id *and* name, so either key resolves.
    ssh_info: HashMap<String, RemoteSshInfo>,
}

/// Parse `mng list --json` output: agent ids plus SSH info for agents on
/// remote hosts.
fn parse_agents_json(raw: &str) -> ParsedAgents {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse agent list output");
            return ParsedAgents::default();
        }
    };

    let mut parsed = ParsedAgents::default();
    let agents = value
        .get("agents")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    for agent in agents {
        let Some(agent_id) = agent.get("id").and_then(|v| v.as_str()) else {
            continue;
        };
        parsed.agent_ids.push(agent_id.to_string());

        let ssh = agent.get("host").and_then(|h| h.get("ssh"));
        let Some(ssh) = ssh else { continue };

        match serde_json::from_value::<RemoteSshInfo>(ssh.clone()) {
            Ok(info) => {
                parsed.ssh_info.insert(agent_id.to_string(), info.clone());
                if let Some(name) = agent.get("name").and_then(|v| v.as_str()) {
                    parsed.ssh_info.insert(name.to_string(), info);
                }
            }
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "failed to parse SSH info for agent");
            }
        }
    }
    parsed
}

/// Resolves agents and server names to backend URLs.
#[async_trait]
pub trait BackendResolver: Send + Sync {
    /// URL of a specific server of an agent, or `None` if unknown/offline.
    async fn get_backend_url(&self, agent: &str, server: &str) -> Option<String>;

    /// All known agent ids.
    async fn list_known_agents(&self) -> Vec<String>;

    /// All known server names for an agent, sorted.
    async fn list_servers_for_agent(&self, agent: &str) -> Vec<String>;

    /// SSH info for the agent's host; `None` means local.
    async fn get_ssh_info(&self, _agent: &str) -> Option<RemoteSshInfo> {
        None
    }
}

/// Static resolver for tests: `{agent: {server: url}}`.
#[derive(Debug, Clone, Default)]
pub struct StaticBackendResolver {
    url_by_agent_and_server: HashMap<String, HashMap<String, String>>,
    ssh_info_by_agent: HashMap<String, RemoteSshInfo>,
}

impl StaticBackendResolver {
    pub fn new(url_by_agent_and_server: HashMap<String, HashMap<String, String>>) -> Self {
        Self {
            url_by_agent_and_server,
            ssh_info_by_agent: HashMap::new(),
        }
    }

    pub fn with_ssh_info(mut self, agent: impl Into<String>, info: RemoteSshInfo) -> Self {
        self.ssh_info_by_agent.insert(agent.into(), info);
        self
    }
}

#[async_trait]
impl BackendResolver for StaticBackendResolver {
    async fn get_backend_url(&self, agent: &str, server: &str) -> Option<String> {
        self.url_by_agent_and_server.get(agent)?.get(server).cloned()
    }

    async fn list_known_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.url_by_agent_and_server.keys().cloned().collect();
        agents.sort();
        agents
    }

    async fn list_servers_for_agent(&self, agent: &str) -> Vec<String> {
        let mut servers: Vec<String> = self
            .url_by_agent_and_server
            .get(agent)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        servers.sort();
        servers
    }

    async fn get_ssh_info(&self, agent: &str) -> Option<RemoteSshInfo> {
        self.ssh_info_by_agent.get(agent).cloned()
    }
}

/// Calls into the fleet CLI. Production uses [`SubprocessMngCli`]; tests
/// provide canned responses.
#[async_trait]
pub trait MngCli: Send + Sync {
    /// Read an agent's log file via `mng logs`. `None` on failure.
    async fn read_agent_log(&self, agent: &str, log_file: &str) -> Option<String>;

    /// List agents via `mng list --json`. `None` on failure.
    async fn list_agents_json(&self) -> Option<String>;
}

/// Shells out to the `mng` binary.
pub struct SubprocessMngCli {
    binary: String,
}

impl SubprocessMngCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SubprocessMngCli {
    fn default() -> Self {
        Self::new(mng_core::config::DEFAULT_CLI_BINARY)
    }
}

#[async_trait]
impl MngCli for SubprocessMngCli {
    async fn read_agent_log(&self, agent: &str, log_file: &str) -> Option<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["logs", agent, log_file, "--quiet"]);
        let finished = match run_with_timeout(cmd, Some(CLI_TIMEOUT), "mng logs").await {
            Ok(finished) => finished,
            Err(e) => {
                tracing::warn!(agent, error = %e, "failed to run mng logs");
                return None;
            }
        };
        if !finished.is_success() {
            tracing::debug!(agent, stderr = %finished.stderr.trim(), "mng logs returned non-zero");
            return None;
        }
        Some(finished.stdout)
    }

    async fn list_agents_json(&self) -> Option<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["list", "--json", "--quiet"]);
        let finished = match run_with_timeout(cmd, Some(CLI_TIMEOUT), "mng list").await {
            Ok(finished) => finished,
            Err(e) => {
                tracing::warn!(error = %e, "failed to run mng list");
                return None;
            }
        };
        if !finished.is_success() {
            tracing::warn!(stderr = %finished.stderr.trim(), "mng list failed");
            return None;
        }
        Some(finished.stdout)
    }
}

struct CachedServers {
    fetched_at: Instant,
    servers: HashMap<String, String>,
}

struct CachedAgents {
    fetched_at: Instant,
    parsed: ParsedAgents,
}

/// Production resolver backed by the fleet CLI, with a TTL cache.
pub struct CliBackendResolver {
    cli: Box<dyn MngCli>,
    server_cache: Mutex<HashMap<String, CachedServers>>,
    agents_cache: Mutex<Option<CachedAgents>>,
}

impl CliBackendResolver {
    pub fn new(cli: Box<dyn MngCli>) -> Self {
        Self {
            cli,
            server_cache: Mutex::new(HashMap::new()),
            agents_cache: Mutex::new(None),
        }
    }

    /// Server map for one agent, consulting the cache first.
    ///
    /// A CLI failure serves the previous value (even past its TTL) rather
    /// than replacing it with an empty map; the refresh is retried on the
    /// next call.
    async fn resolve_servers(&self, agent: &str) -> HashMap<String, String> {
        if let Some(cached) = self.server_cache.lock().get(agent) {
            if cached.fetched_at.elapsed() < CACHE_TTL {
                return cached.servers.clone();
            }
        }

        match self.cli.read_agent_log(agent, SERVERS_LOG_FILENAME).await {
            Some(log_content) => {
                let servers = parse_server_log(&log_content);
                self.server_cache.lock().insert(
                    agent.to_string(),
                    CachedServers {
                        fetched_at: Instant::now(),
                        servers: servers.clone(),
                    },
                );
                servers
            }
            None => self
                .server_cache
                .lock()
                .get(agent)
                .map(|cached| cached.servers.clone())
                .unwrap_or_default(),
        }
    }

    async fn resolve_agents(&self) -> ParsedAgents {
        if let Some(cached) = self.agents_cache.lock().as_ref() {
            if cached.fetched_at.elapsed() < CACHE_TTL {
                return cached.parsed.clone();
            }
        }

        match self.cli.list_agents_json().await {
            Some(raw) => {
                let parsed = parse_agents_json(&raw);
                *self.agents_cache.lock() = Some(CachedAgents {
                    fetched_at: Instant::now(),
                    parsed: parsed.clone(),
                });
                parsed
            }
            None => self
                .agents_cache
                .lock()
                .as_ref()
                .map(|cached| cached.parsed.clone())
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl BackendResolver for CliBackendResolver {
    async fn get_backend_url(&self, agent: &str, server: &str) -> Option<String> {
        self.resolve_servers(agent).await.get(server).cloned()
    }

    async fn list_known_agents(&self) -> Vec<String> {
        self.resolve_agents().await.agent_ids
    }

    async fn list_servers_for_agent(&self, agent: &str) -> Vec<String> {
        let mut servers: Vec<String> = self.resolve_servers(agent).await.into_keys().collect();
        servers.sort();
        servers
    }

    async fn get_ssh_info(&self, agent: &str) -> Option<RemoteSshInfo> {
        self.resolve_agents().await.ssh_info.get(agent).cloned()
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
