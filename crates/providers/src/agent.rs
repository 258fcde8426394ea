// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent variants and the type registry.
//!
//! Agents are variant records keyed by `agent_type`. Variants interact with
//! the rest of the system only through the [`Agent`] trait; the registry
//! maps type names to constructors so new variants can be added without
//! touching callers.
//!
//! Built-in variants:
//! - `process`: a bare process in a session; messages are raw keystrokes.
//! - `tui`: an interactive TUI driven through the marker-based tmux send
//!   protocol.
//! - `skill`: a `tui` agent that installs a skill file during provisioning.

use crate::host::{HostCommandRunner, OnlineHost};
use async_trait::async_trait;
use mng_adapters::env::parse_env_file;
use mng_adapters::tmux::TmuxController;
use mng_core::agent_data::CertifiedAgentData;
use mng_core::error::MngError;
use mng_core::id::AgentId;
use mng_core::name::AgentName;
use mng_core::state::AgentLifecycleState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default time to wait for a freshly started agent's session to exist.
const DEFAULT_READY_TIMEOUT_SECONDS: f64 = 30.0;

/// A process tree running inside a host, attached to a terminal session.
#[async_trait]
pub trait Agent: Send + Sync {
    fn data(&self) -> &CertifiedAgentData;

    fn id(&self) -> &AgentId {
        &self.data().id
    }

    fn name(&self) -> &AgentName {
        &self.data().name
    }

    /// Start the agent's terminal session. Idempotent: starting a running
    /// agent succeeds without side effects.
    async fn start(&self, host: &OnlineHost) -> Result<(), MngError>;

    /// Kill the agent's terminal session, if any.
    async fn stop(&self, host: &OnlineHost) -> Result<(), MngError>;

    async fn send_message(&self, host: &OnlineHost, content: &str) -> Result<(), MngError>;

    async fn get_lifecycle_state(&self, host: &OnlineHost)
        -> Result<AgentLifecycleState, MngError>;

    /// Current pane content, or `None` when capture fails.
    async fn capture_pane_content(&self, host: &OnlineHost) -> Option<String>;

    /// Message sent automatically after a restart, if any.
    fn get_resume_message(&self) -> Option<String> {
        None
    }

    fn get_ready_timeout_seconds(&self) -> f64 {
        DEFAULT_READY_TIMEOUT_SECONDS
    }

    /// Variant-specific provisioning, run between the provisioning hooks.
    async fn provision(&self, _host: &OnlineHost) -> Result<(), MngError> {
        Ok(())
    }

    /// Cleanup hook, called before the agent's state directory is removed.
    async fn on_destroy(&self, _host: &OnlineHost) -> Result<(), MngError> {
        Ok(())
    }
}

fn tmux_for(host: &OnlineHost) -> TmuxController<HostCommandRunner> {
    TmuxController::new(HostCommandRunner::new(host.clone()))
}

async fn read_agent_env(host: &OnlineHost, id: &AgentId) -> Result<Vec<(String, String)>, MngError> {
    let env_path = host.paths().agent_env_file(id);
    Ok(host
        .connector()
        .read_file(&env_path)
        .await?
        .map(|contents| parse_env_file(&contents))
        .unwrap_or_default())
}

/// Whether a newer agent record with the same name exists on the host.
///
/// The newer record owns the shared session name, which makes this agent
/// REPLACED while the session is alive.
async fn newer_same_name_exists(
    host: &OnlineHost,
    data: &CertifiedAgentData,
) -> Result<bool, MngError> {
    for record in host.list_agent_records().await? {
        let id = record.get("id").and_then(|v| v.as_str());
        let name = record.get("name").and_then(|v| v.as_str());
        let create_time = record
            .get("create_time")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok());

        if let (Some(id), Some(name), Some(create_time)) = (id, name, create_time) {
            if id != data.id.as_str()
                && name == data.name.as_str()
                && create_time.with_timezone(&chrono::Utc) > data.create_time
            {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

async fn session_exists(host: &OnlineHost, session: &str) -> Result<bool, MngError> {
    tmux_for(host)
        .has_session(session)
        .await
        .map_err(|e| MngError::CommandFailed(e.to_string()))
}

async fn start_session(
    host: &OnlineHost,
    data: &CertifiedAgentData,
    session: &str,
) -> Result<(), MngError> {
    let work_dir = Path::new(&data.work_dir);
    let check = host
        .execute_command(
            &format!(
                "test -d '{}'",
                crate::connector::shell_escape_single_quotes(&data.work_dir)
            ),
            Some(Duration::from_secs(10)),
        )
        .await?;
    if !check.success {
        return Err(MngError::AgentStart {
            agent: data.name.clone(),
            reason: format!("work dir does not exist: {}", data.work_dir),
        });
    }

    let env = read_agent_env(host, &data.id).await?;
    tmux_for(host)
        .new_session(session, work_dir, &data.command, &env)
        .await
        .map_err(|e| MngError::AgentStart {
            agent: data.name.clone(),
            reason: e.to_string(),
        })
}

/// An interactive TUI agent driven through the tmux send protocol.
pub struct TuiAgent {
    data: CertifiedAgentData,
}

impl TuiAgent {
    pub fn new(data: CertifiedAgentData) -> Self {
        Self { data }
    }

    fn session_name(&self, host: &OnlineHost) -> String {
        host.config().session_name(self.data.name.as_str())
    }
}

#[async_trait]
impl Agent for TuiAgent {
    fn data(&self) -> &CertifiedAgentData {
        &self.data
    }

    async fn start(&self, host: &OnlineHost) -> Result<(), MngError> {
        let session = self.session_name(host);
        if session_exists(host, &session).await? {
            return Ok(());
        }
        start_session(host, &self.data, &session).await?;

        // The idleness hook removes this sentinel when the agent goes quiet.
        let active = host.paths().agent_active_file(&self.data.id);
        host.write_text_file(&active, "").await
    }

    async fn stop(&self, host: &OnlineHost) -> Result<(), MngError> {
        let session = self.session_name(host);
        tmux_for(host)
            .kill_session(&session)
            .await
            .map_err(|e| MngError::CommandFailed(e.to_string()))
    }

    async fn send_message(&self, host: &OnlineHost, content: &str) -> Result<(), MngError> {
        let session = self.session_name(host);
        tmux_for(host)
            .send_message(&session, content)
            .await
            .map_err(|e| MngError::SendMessage {
                agent: self.data.name.clone(),
                reason: e.reason,
            })
    }

    async fn get_lifecycle_state(
        &self,
        host: &OnlineHost,
    ) -> Result<AgentLifecycleState, MngError> {
        let session = self.session_name(host);
        if !session_exists(host, &session).await? {
            return Ok(AgentLifecycleState::Stopped);
        }
        if newer_same_name_exists(host, &self.data).await? {
            return Ok(AgentLifecycleState::Replaced);
        }

        let active = host.paths().agent_active_file(&self.data.id);
        let is_active = host.connector().read_file(&active).await?.is_some();
        if is_active {
            Ok(AgentLifecycleState::Running)
        } else {
            Ok(AgentLifecycleState::Waiting)
        }
    }

    async fn capture_pane_content(&self, host: &OnlineHost) -> Option<String> {
        let session = self.session_name(host);
        tmux_for(host).capture_pane(&session).await
    }

    fn get_resume_message(&self) -> Option<String> {
        self.data
            .extra
            .get("resume_message")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// A bare process agent: a session without the message protocol.
pub struct ProcessAgent {
    data: CertifiedAgentData,
}

impl ProcessAgent {
    pub fn new(data: CertifiedAgentData) -> Self {
        Self { data }
    }

    fn session_name(&self, host: &OnlineHost) -> String {
        host.config().session_name(self.data.name.as_str())
    }
}

#[async_trait]
impl Agent for ProcessAgent {
    fn data(&self) -> &CertifiedAgentData {
        &self.data
    }

    async fn start(&self, host: &OnlineHost) -> Result<(), MngError> {
        let session = self.session_name(host);
        if session_exists(host, &session).await? {
            return Ok(());
        }
        start_session(host, &self.data, &session).await
    }

    async fn stop(&self, host: &OnlineHost) -> Result<(), MngError> {
        let session = self.session_name(host);
        tmux_for(host)
            .kill_session(&session)
            .await
            .map_err(|e| MngError::CommandFailed(e.to_string()))
    }

    async fn send_message(&self, host: &OnlineHost, content: &str) -> Result<(), MngError> {
        // No input handler to race against, so literal keystrokes plus
        // Enter are enough.
        let session = self.session_name(host);
        let tmux = tmux_for(host);
        let send = async {
            tmux.send_literal(&session, content).await?;
            tmux.send_enter(&session).await
        };
        send.await.map_err(|e| MngError::SendMessage {
            agent: self.data.name.clone(),
            reason: e.reason,
        })
    }

    async fn get_lifecycle_state(
        &self,
        host: &OnlineHost,
    ) -> Result<AgentLifecycleState, MngError> {
        let session = self.session_name(host);
        if session_exists(host, &session).await? {
            Ok(AgentLifecycleState::Running)
        } else {
            Ok(AgentLifecycleState::Stopped)
        }
    }

    async fn capture_pane_content(&self, host: &OnlineHost) -> Option<String> {
        let session = self.session_name(host);
        tmux_for(host).capture_pane(&session).await
    }
}

/// A TUI agent that installs a skill file before first run.
///
/// The skill's name and contents come from the agent's certified data
/// (`skill_name`, `skill_content`); the file lands under the work dir where
/// the TUI discovers it.
pub struct SkillAgent {
    inner: TuiAgent,
}

impl SkillAgent {
    pub fn new(data: CertifiedAgentData) -> Self {
        Self {
            inner: TuiAgent::new(data),
        }
    }

    fn skill_file(&self) -> Option<(PathBuf, String)> {
        let data = self.inner.data();
        let name = data.extra.get("skill_name").and_then(|v| v.as_str())?;
        let content = data.extra.get("skill_content").and_then(|v| v.as_str())?;
        let path = Path::new(&data.work_dir)
            .join(".skills")
            .join(name)
            .join("SKILL.md");
        Some((path, content.to_string()))
    }
}

#[async_trait]
impl Agent for SkillAgent {
    fn data(&self) -> &CertifiedAgentData {
        self.inner.data()
    }

    async fn start(&self, host: &OnlineHost) -> Result<(), MngError> {
        self.inner.start(host).await
    }

    async fn stop(&self, host: &OnlineHost) -> Result<(), MngError> {
        self.inner.stop(host).await
    }

    async fn send_message(&self, host: &OnlineHost, content: &str) -> Result<(), MngError> {
        self.inner.send_message(host, content).await
    }

    async fn get_lifecycle_state(
        &self,
        host: &OnlineHost,
    ) -> Result<AgentLifecycleState, MngError> {
        self.inner.get_lifecycle_state(host).await
    }

    async fn capture_pane_content(&self, host: &OnlineHost) -> Option<String> {
        self.inner.capture_pane_content(host).await
    }

    fn get_resume_message(&self) -> Option<String> {
        self.inner.get_resume_message()
    }

    async fn provision(&self, host: &OnlineHost) -> Result<(), MngError> {
        match self.skill_file() {
            Some((path, content)) => host.write_text_file(&path, &content).await,
            None => {
                tracing::warn!(
                    agent = %self.data().name,
                    "skill agent has no skill_name/skill_content, nothing to install"
                );
                Ok(())
            }
        }
    }
}

/// Constructor for one agent variant.
pub type AgentConstructor = Arc<dyn Fn(CertifiedAgentData) -> Arc<dyn Agent> + Send + Sync>;

/// Maps `agent_type` names to variant constructors.
#[derive(Clone)]
pub struct AgentRegistry {
    constructors: HashMap<String, AgentConstructor>,
}

impl AgentRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the built-in variants.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("process", Arc::new(|data| Arc::new(ProcessAgent::new(data))));
        registry.register("tui", Arc::new(|data| Arc::new(TuiAgent::new(data))));
        registry.register("skill", Arc::new(|data| Arc::new(SkillAgent::new(data))));
        registry
    }

    pub fn register(&mut self, agent_type: impl Into<String>, constructor: AgentConstructor) {
        self.constructors.insert(agent_type.into(), constructor);
    }

    pub fn build(&self, data: CertifiedAgentData) -> Result<Arc<dyn Agent>, MngError> {
        match self.constructors.get(&data.agent_type) {
            Some(constructor) => Ok(constructor(data)),
            None => Err(MngError::OperationNotSupported(format!(
                "unknown agent type: {}",
                data.agent_type
            ))),
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Destroy an agent: stop it, run its cleanup hook, remove its state dir.
///
/// The state directory is removed even when `on_destroy` fails; the hook's
/// error still propagates afterward.
pub async fn destroy_agent(host: &OnlineHost, agent: &dyn Agent) -> Result<(), MngError> {
    if let Err(e) = agent.stop(host).await {
        tracing::warn!(agent = %agent.name(), error = %e, "failed to stop agent during destroy");
    }

    let destroy_result = agent.on_destroy(host).await;
    let remove_result = host.remove_agent_state_dir(agent.id()).await;

    match destroy_result {
        Err(e) => {
            if let Err(remove_err) = remove_result {
                tracing::warn!(
                    agent = %agent.name(),
                    error = %remove_err,
                    "failed to remove agent state dir after on_destroy error"
                );
            }
            Err(e)
        }
        Ok(()) => remove_result,
    }
}

/// Wait until the agent's session exists, bounded by its ready timeout.
pub async fn await_ready(host: &OnlineHost, agent: &dyn Agent) -> Result<(), MngError> {
    let timeout = Duration::from_secs_f64(agent.get_ready_timeout_seconds());
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let state = agent.get_lifecycle_state(host).await?;
        if state.can_receive_messages() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(MngError::AgentStart {
                agent: agent.name().clone(),
                reason: format!(
                    "agent not ready within {:.0}s",
                    agent.get_ready_timeout_seconds()
                ),
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
