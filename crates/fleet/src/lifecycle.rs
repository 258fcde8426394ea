// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Start-if-needed helpers shared by fleet operations.

use mng_core::error::MngError;
use mng_core::state::AgentLifecycleState;
use mng_providers::agent::{await_ready, Agent};
use mng_providers::host::OnlineHost;
use mng_providers::provider::{HostHandle, Provider};

/// Materialize an online host, starting it when allowed.
///
/// Returns the host and whether a start was performed.
pub async fn ensure_host_started(
    provider: &dyn Provider,
    handle: HostHandle,
    is_start_desired: bool,
) -> Result<(OnlineHost, bool), MngError> {
    match handle {
        HostHandle::Online(host) => Ok((host, false)),
        HostHandle::Offline(offline) => {
            if !is_start_desired {
                return Err(MngError::HostOffline(offline.id().to_string()));
            }
            tracing::info!(host_id = %offline.id(), "starting offline host");
            let host = provider.start_host(offline.id(), None).await?;
            Ok((host, true))
        }
    }
}

/// Start a stopped agent, wait for readiness, and deliver its resume
/// message if it has one.
///
/// Returns whether a start was performed.
pub async fn ensure_agent_started(
    host: &OnlineHost,
    agent: &dyn Agent,
) -> Result<bool, MngError> {
    let state = agent.get_lifecycle_state(host).await?;
    if state != AgentLifecycleState::Stopped {
        return Ok(false);
    }

    tracing::info!(agent = %agent.name(), "starting stopped agent");
    agent.start(host).await?;
    await_ready(host, agent).await?;

    if let Some(message) = agent.get_resume_message() {
        agent.send_message(host, &message).await?;
    }
    Ok(true)
}
