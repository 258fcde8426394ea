// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run a shell command on the hosts of matching agents.
//!
//! Same two-phase shape as the message fan-out, but phase 2 runs
//! `execute_command` on each agent's host instead of driving the tmux
//! protocol.

use crate::lifecycle::ensure_host_started;
use crate::list::{load_all_agents_grouped_by_host, FleetContext};
use mng_core::command::CommandResult;
use mng_core::error::MngError;
use mng_core::filter::FilterSet;
use mng_core::state::ErrorBehavior;
use mng_providers::host::OnlineHost;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const MAX_CONCURRENT_EXECS: usize = 32;

/// Aggregated result of an exec fan-out.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// `(agent_name, command_result)` for commands that ran.
    pub outputs: Vec<(String, CommandResult)>,
    /// `(agent_name, error_message)` for targets that never ran.
    pub failed_agents: Vec<(String, String)>,
}

impl ExecResult {
    pub fn exit_code(&self) -> i32 {
        let any_command_failed = self.outputs.iter().any(|(_, result)| !result.success);
        if self.failed_agents.is_empty() && !any_command_failed {
            0
        } else {
            1
        }
    }
}

/// Execute `command` on the host of every agent matching the filters.
pub async fn exec_on_agents(
    ctx: &FleetContext,
    command: &str,
    include: Vec<String>,
    exclude: Vec<String>,
    all: bool,
    error_behavior: ErrorBehavior,
    timeout: Option<Duration>,
) -> Result<ExecResult, MngError> {
    let filters = FilterSet::compile(&include, &exclude)?;
    let abort = error_behavior == ErrorBehavior::Abort;
    let result = Arc::new(Mutex::new(ExecResult::default()));

    if !all && !filters.has_includes() {
        return Ok(result.lock().clone());
    }

    let grouped = load_all_agents_grouped_by_host(ctx).await?;
    let mut targets: Vec<(String, OnlineHost)> = Vec::new();

    for (host_reference, agent_references) in grouped {
        if agent_references.is_empty() {
            continue;
        }
        let provider = ctx.providers.get(host_reference.provider_name.as_str())?;
        let handle = provider.get_host(host_reference.host_id.as_str()).await?;
        let host = match ensure_host_started(provider.as_ref(), handle, false).await {
            Ok((host, _)) => host,
            Err(e) => {
                if abort {
                    return Err(e);
                }
                for reference in &agent_references {
                    result
                        .lock()
                        .failed_agents
                        .push((reference.agent_name.to_string(), e.to_string()));
                }
                continue;
            }
        };

        for reference in agent_references {
            let context = serde_json::json!({
                "id": reference.agent_id.as_str(),
                "name": reference.agent_name.as_str(),
                "type": reference.certified_data.get("type").and_then(|v| v.as_str()),
                "host": {
                    "id": reference.host_id.as_str(),
                    "provider": host_reference.provider_name.as_str(),
                },
            });
            if !filters.selects(&context) {
                continue;
            }
            targets.push((reference.agent_name.to_string(), host.clone()));
        }
    }

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_EXECS));
    let mut tasks: JoinSet<()> = JoinSet::new();

    for (agent_name, host) in targets {
        let semaphore = semaphore.clone();
        let result = result.clone();
        let command = command.to_string();

        tasks.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            match host.execute_command(&command, timeout).await {
                Ok(output) => result.lock().outputs.push((agent_name, output)),
                Err(e) => result.lock().failed_agents.push((agent_name, e.to_string())),
            }
        });
    }
    while tasks.join_next().await.is_some() {}

    let final_result = result.lock().clone();
    if abort {
        if let Some((agent_name, error)) = final_result.failed_agents.first() {
            return Err(MngError::CommandFailed(format!(
                "exec on {} failed: {}",
                agent_name, error
            )));
        }
    }
    Ok(final_result)
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
