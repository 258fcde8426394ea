// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enforcement: stop idle hosts and unstick stalled state transitions.
//!
//! Walks every provider's hosts. RUNNING hosts past their idle timeout are
//! stopped (and marked PAUSED). STARTING hosts past the starting timeout
//! are stopped. STOPPING hosts past the stopping timeout are destroyed,
//! since a controlled stop has already failed. BUILDING hosts are skipped:
//! no creation timestamp is available at this layer.

use mng_core::error::MngError;
use mng_core::id::HostId;
use mng_core::name::ProviderInstanceName;
use mng_core::state::{ErrorBehavior, HostState, StopReason};
use mng_providers::host::OnlineHost;
use mng_providers::provider::{HostHandle, Provider, ProviderRegistry};
use std::time::Duration;

/// One enforcement action taken or proposed.
#[derive(Debug, Clone, PartialEq)]
pub struct EnforceAction {
    pub host_id: HostId,
    pub host_name: String,
    pub provider_name: ProviderInstanceName,
    /// Host state at the time of the action.
    pub host_state: HostState,
    /// `stop_host` or `destroy_host`.
    pub action: &'static str,
    pub reason: String,
    pub is_dry_run: bool,
}

/// Aggregated results of one enforcement pass.
#[derive(Debug, Clone, Default)]
pub struct EnforceResult {
    pub actions: Vec<EnforceAction>,
    pub hosts_checked: usize,
    pub idle_violations: usize,
    pub timeout_violations: usize,
    pub errors: Vec<String>,
}

/// Options for an enforcement pass.
#[derive(Debug, Clone)]
pub struct EnforceOptions {
    pub check_idle: bool,
    pub check_timeouts: bool,
    pub starting_timeout_seconds: u64,
    pub stopping_timeout_seconds: u64,
    pub dry_run: bool,
    pub error_behavior: ErrorBehavior,
}

impl Default for EnforceOptions {
    fn default() -> Self {
        Self {
            check_idle: true,
            check_timeouts: true,
            starting_timeout_seconds: 600,
            stopping_timeout_seconds: 600,
            dry_run: false,
            error_behavior: ErrorBehavior::Continue,
        }
    }
}

/// Run one enforcement pass over all providers' hosts.
pub async fn enforce(
    providers: &ProviderRegistry,
    options: &EnforceOptions,
) -> Result<EnforceResult, MngError> {
    let mut result = EnforceResult::default();

    for provider in providers.all() {
        let hosts = match provider.list_hosts(false).await {
            Ok(hosts) => hosts,
            Err(e) => {
                let error = format!("Failed to list hosts for provider {}: {}", provider.name(), e);
                result.errors.push(error.clone());
                if options.error_behavior == ErrorBehavior::Abort {
                    return Err(e);
                }
                tracing::warn!("{}", error);
                continue;
            }
        };

        for handle in hosts {
            result.hosts_checked += 1;
            if let Err(e) = enforce_host(provider.as_ref(), &handle, options, &mut result).await {
                let error = format!("Failed to enforce host {}: {}", handle.id(), e);
                result.errors.push(error.clone());
                if options.error_behavior == ErrorBehavior::Abort {
                    return Err(e);
                }
                tracing::warn!("{}", error);
            }
        }
    }

    Ok(result)
}

/// Run enforcement passes repeatedly at a fixed interval.
///
/// `max_iterations` bounds the loop for callers that are not daemons; pass
/// `None` to run until the task is cancelled.
pub async fn enforce_watch(
    providers: &ProviderRegistry,
    options: &EnforceOptions,
    interval: Duration,
    max_iterations: Option<usize>,
) -> Result<Vec<EnforceResult>, MngError> {
    let mut results = Vec::new();
    let mut iterations = 0usize;
    loop {
        results.push(enforce(providers, options).await?);
        iterations += 1;
        if let Some(max) = max_iterations {
            if iterations >= max {
                return Ok(results);
            }
        }
        tokio::time::sleep(interval).await;
    }
}

async fn enforce_host(
    provider: &dyn Provider,
    handle: &HostHandle,
    options: &EnforceOptions,
    result: &mut EnforceResult,
) -> Result<(), MngError> {
    let state = handle.get_state().await?;

    match state {
        HostState::Running => {
            if options.check_idle {
                check_idle_host(provider, handle, options, result).await?;
            }
        }
        HostState::Building => {
            if options.check_timeouts {
                tracing::debug!(
                    host_id = %handle.id(),
                    "skipped timeout check for BUILDING host (no creation timestamp available)"
                );
            }
        }
        HostState::Starting => {
            if options.check_timeouts {
                check_stuck_host(
                    provider,
                    handle,
                    HostState::Starting,
                    options.starting_timeout_seconds,
                    options,
                    result,
                )
                .await?;
            }
        }
        HostState::Stopping => {
            if options.check_timeouts {
                check_stuck_host(
                    provider,
                    handle,
                    HostState::Stopping,
                    options.stopping_timeout_seconds,
                    options,
                    result,
                )
                .await?;
            }
        }
        HostState::Stopped
        | HostState::Paused
        | HostState::Crashed
        | HostState::Failed
        | HostState::Destroyed => {
            tracing::trace!(host_id = %handle.id(), state = %state, "nothing to enforce");
        }
    }
    Ok(())
}

async fn check_idle_host(
    provider: &dyn Provider,
    handle: &HostHandle,
    options: &EnforceOptions,
    result: &mut EnforceResult,
) -> Result<(), MngError> {
    let host = match handle {
        HostHandle::Online(host) => host,
        HostHandle::Offline(_) => {
            tracing::trace!(host_id = %handle.id(), "skipped idle check (not online)");
            return Ok(());
        }
    };

    // Local hosts cannot be stopped through their provider.
    if host.is_local() {
        tracing::trace!(host_id = %host.id(), "skipped idle check for local host");
        return Ok(());
    }

    let idle_seconds = match host.get_idle_seconds().await {
        Ok(idle) => idle,
        Err(MngError::HostOffline(_)) => {
            tracing::trace!(host_id = %host.id(), "skipped idle check (went offline)");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let idle_timeout = host.get_activity_config().await?.idle_timeout_seconds;
    if idle_seconds <= idle_timeout as f64 {
        tracing::trace!(
            host_id = %host.id(),
            idle_seconds,
            idle_timeout,
            "host is within idle timeout"
        );
        return Ok(());
    }

    let reason = format!(
        "Host idle for {:.0}s, exceeding timeout of {}s",
        idle_seconds, idle_timeout
    );
    tracing::info!(host_id = %host.id(), reason, dry_run = options.dry_run, "stopping idle host");

    if !options.dry_run {
        mark_paused(host).await?;
        provider.stop_host(host.id(), true).await?;
    }

    result.actions.push(EnforceAction {
        host_id: host.id().clone(),
        host_name: host.name().to_string(),
        provider_name: provider.name().clone(),
        host_state: HostState::Running,
        action: "stop_host",
        reason,
        is_dry_run: options.dry_run,
    });
    result.idle_violations += 1;
    Ok(())
}

/// An idle stop is a pause: the certified record says so before the
/// provider takes the host down.
async fn mark_paused(host: &OnlineHost) -> Result<(), MngError> {
    let mut data = host.get_certified_data().await?;
    data.state = HostState::Paused;
    data.stop_reason = Some(StopReason::Paused);
    host.set_certified_data(&data).await
}

async fn check_stuck_host(
    provider: &dyn Provider,
    handle: &HostHandle,
    state: HostState,
    timeout_seconds: u64,
    options: &EnforceOptions,
    result: &mut EnforceResult,
) -> Result<(), MngError> {
    let host = match handle {
        HostHandle::Online(host) => host,
        HostHandle::Offline(_) => {
            tracing::trace!(host_id = %handle.id(), "skipped stuck check (not online)");
            return Ok(());
        }
    };

    let uptime_seconds = match host.get_uptime_seconds().await {
        Ok(uptime) => uptime,
        Err(MngError::HostOffline(_)) => {
            tracing::trace!(host_id = %host.id(), "skipped stuck check (went offline)");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if uptime_seconds <= timeout_seconds as f64 {
        tracing::trace!(
            host_id = %host.id(),
            uptime_seconds,
            timeout_seconds,
            "host within transition timeout"
        );
        return Ok(());
    }

    let reason = format!(
        "Host stuck in {} for {:.0}s, exceeding timeout of {}s",
        state, uptime_seconds, timeout_seconds
    );

    // A host that failed to stop gets destroyed, not re-stopped.
    let (action, is_destroy): (&'static str, bool) = if state == HostState::Stopping {
        ("destroy_host", true)
    } else {
        ("stop_host", false)
    };
    tracing::info!(host_id = %host.id(), reason, action, dry_run = options.dry_run, "unsticking host");

    if !options.dry_run {
        if is_destroy {
            provider.destroy_host(host.id()).await?;
        } else {
            provider.stop_host(host.id(), true).await?;
        }
    }

    result.actions.push(EnforceAction {
        host_id: host.id().clone(),
        host_name: host.name().to_string(),
        provider_name: provider.name().clone(),
        host_state: state,
        action,
        reason,
        is_dry_run: options.dry_run,
    });
    result.timeout_violations += 1;
    Ok(())
}

#[cfg(test)]
#[path = "enforce_tests.rs"]
mod tests;
