// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message fan-out: deliver one message to every matching agent.
//!
//! Two phases. Phase 1 resolves hosts and filters agents sequentially (it
//! is nearly all local reads). Phase 2 sends concurrently on a bounded
//! worker pool, because each send blocks on remote I/O and the tmux
//! protocol's polling. One agent's failure never blocks the others.

use crate::lifecycle::{ensure_agent_started, ensure_host_started};
use crate::list::{load_all_agents_grouped_by_host, FleetContext};
use mng_core::agent_data::CertifiedAgentData;
use mng_core::error::MngError;
use mng_core::filter::FilterSet;
use mng_core::state::ErrorBehavior;
use mng_providers::agent::Agent;
use mng_providers::host::OnlineHost;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Bounded concurrency for the send phase.
const MAX_CONCURRENT_SENDS: usize = 32;

/// Callback invoked after each successful send, with the agent name.
pub type SuccessCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Callback invoked after each failed send, with the agent name and error.
pub type ErrorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Options for [`send_message_to_agents`].
#[derive(Clone, Default)]
pub struct MessageOptions {
    /// Include filter terms; see [`FilterSet`].
    pub include: Vec<String>,
    /// Exclude filter terms.
    pub exclude: Vec<String>,
    /// Send to all agents (excludes still apply).
    pub all: bool,
    pub error_behavior: ErrorBehavior,
    /// Start offline hosts and stopped agents before sending.
    pub start: bool,
    pub on_success: Option<SuccessCallback>,
    pub on_error: Option<ErrorCallback>,
}

/// Aggregated result of a message fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageResult {
    pub successful_agents: Vec<String>,
    /// `(agent_name, error_message)` per failure.
    pub failed_agents: Vec<(String, String)>,
}

impl MessageResult {
    pub fn exit_code(&self) -> i32 {
        if self.failed_agents.is_empty() {
            0
        } else {
            1
        }
    }
}

struct SharedResult {
    result: Mutex<MessageResult>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl SharedResult {
    fn record_success(&self, agent_name: &str) {
        self.result
            .lock()
            .successful_agents
            .push(agent_name.to_string());
        if let Some(callback) = &self.on_success {
            callback(agent_name);
        }
    }

    fn record_failure(&self, agent_name: &str, error: &str) {
        self.result
            .lock()
            .failed_agents
            .push((agent_name.to_string(), error.to_string()));
        if let Some(callback) = &self.on_error {
            callback(agent_name, error);
        }
    }
}

/// The filter context for one agent: `{id, name, type, state, host.*}`.
fn agent_filter_context(
    data: &CertifiedAgentData,
    state: mng_core::state::AgentLifecycleState,
    provider_name: &str,
) -> serde_json::Value {
    serde_json::json!({
        "id": data.id.as_str(),
        "name": data.name.as_str(),
        "type": data.agent_type,
        "state": state.to_string(),
        "host": {
            "id": data.host_id.as_str(),
            "provider": provider_name,
        },
    })
}

/// Send a message to every agent matching the filters.
///
/// With `Abort` error behavior the first failure raises; with `Continue`
/// failures are recorded and the fan-out keeps going.
pub async fn send_message_to_agents(
    ctx: &FleetContext,
    message: &str,
    options: MessageOptions,
) -> Result<MessageResult, MngError> {
    let filters = FilterSet::compile(&options.include, &options.exclude)?;
    let abort = options.error_behavior == ErrorBehavior::Abort;

    let shared = Arc::new(SharedResult {
        result: Mutex::new(MessageResult::default()),
        on_success: options.on_success.clone(),
        on_error: options.on_error.clone(),
    });

    // Nothing selected without --all or include filters; this guards
    // against accidentally messaging the whole fleet.
    if !options.all && !filters.has_includes() {
        return Ok(shared.result.lock().clone());
    }

    // Phase 1: resolve hosts and filter agents (sequential, fast reads).
    let grouped = load_all_agents_grouped_by_host(ctx).await?;
    let mut targets: Vec<(Arc<dyn Agent>, OnlineHost)> = Vec::new();

    for (host_reference, agent_references) in grouped {
        if agent_references.is_empty() {
            continue;
        }

        let provider = match ctx.providers.get(host_reference.provider_name.as_str()) {
            Ok(provider) => provider,
            Err(e) => {
                if abort {
                    return Err(e);
                }
                tracing::warn!(provider = %host_reference.provider_name, "provider not found");
                continue;
            }
        };

        let handle = match provider.get_host(host_reference.host_id.as_str()).await {
            Ok(handle) => handle,
            Err(e) => {
                if abort {
                    return Err(e);
                }
                tracing::warn!(host_id = %host_reference.host_id, error = %e, "error accessing host");
                continue;
            }
        };

        let host = match ensure_host_started(provider.as_ref(), handle, options.start).await {
            Ok((host, _was_started)) => host,
            Err(e) => {
                if abort {
                    return Err(e);
                }
                // The whole host is unreachable: every selected agent on it
                // fails in one stroke.
                let error_text = e.to_string();
                for reference in &agent_references {
                    shared.record_failure(reference.agent_name.as_str(), &error_text);
                }
                continue;
            }
        };

        for reference in agent_references {
            let data: CertifiedAgentData =
                match serde_json::from_value(reference.certified_data.clone()) {
                    Ok(data) => data,
                    Err(e) => {
                        let error = MngError::AgentDataSchema {
                            path: host.paths().agent_data_file(&reference.agent_id),
                            detail: e.to_string(),
                        };
                        if abort {
                            return Err(error);
                        }
                        shared.record_failure(reference.agent_name.as_str(), &error.to_string());
                        continue;
                    }
                };

            let agent = match ctx.agents.build(data.clone()) {
                Ok(agent) => agent,
                Err(e) => {
                    if abort {
                        return Err(e);
                    }
                    shared.record_failure(data.name.as_str(), &e.to_string());
                    continue;
                }
            };

            let state = match agent.get_lifecycle_state(&host).await {
                Ok(state) => state,
                Err(e) => {
                    if abort {
                        return Err(e);
                    }
                    shared.record_failure(data.name.as_str(), &e.to_string());
                    continue;
                }
            };

            let context =
                agent_filter_context(&data, state, host_reference.provider_name.as_str());
            if !filters.selects(&context) {
                continue;
            }

            targets.push((agent, host.clone()));
        }
    }

    // Phase 2: send concurrently on the bounded pool.
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_SENDS));
    let mut tasks: JoinSet<()> = JoinSet::new();

    for (agent, host) in targets {
        let semaphore = semaphore.clone();
        let shared = shared.clone();
        let message = message.to_string();
        let start = options.start;

        tasks.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            send_to_one_agent(agent.as_ref(), &host, &message, start, &shared).await;
        });
    }
    while tasks.join_next().await.is_some() {}

    let result = shared.result.lock().clone();
    if abort {
        if let Some((agent_name, error)) = result.failed_agents.first() {
            return Err(MngError::SendMessage {
                agent: mng_core::name::AgentName::new(agent_name.clone()),
                reason: error.clone(),
            });
        }
    }
    Ok(result)
}

/// Deliver to a single agent from a worker task.
///
/// Known failures are recorded in the shared result; this function never
/// panics the pool.
async fn send_to_one_agent(
    agent: &dyn Agent,
    host: &OnlineHost,
    message: &str,
    is_start_desired: bool,
    shared: &SharedResult,
) {
    let agent_name = agent.name().to_string();

    let state = match agent.get_lifecycle_state(host).await {
        Ok(state) => state,
        Err(e) => {
            shared.record_failure(&agent_name, &e.to_string());
            return;
        }
    };

    if !state.can_receive_messages() {
        if is_start_desired {
            if let Err(e) = ensure_agent_started(host, agent).await {
                shared.record_failure(&agent_name, &e.to_string());
                return;
            }
        } else {
            shared.record_failure(
                &agent_name,
                &format!("Agent has no terminal session (state: {})", state),
            );
            return;
        }
    }

    match agent.send_message(host, message).await {
        Ok(()) => {
            tracing::debug!(agent = %agent_name, "message sent");
            shared.record_success(&agent_name);
        }
        Err(e) => shared.record_failure(&agent_name, &e.to_string()),
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
