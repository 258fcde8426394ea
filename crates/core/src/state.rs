// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle states for hosts and agents.
//!
//! Host states form the machine `BUILDING -> STARTING -> RUNNING ->
//! {STOPPING -> STOPPED, PAUSED, CRASHED, FAILED, DESTROYED}`. A RUNNING
//! host answers commands; STOPPED/PAUSED/CRASHED hosts retain snapshots and
//! can be restarted where the provider supports snapshots; FAILED is
//! terminal for that creation attempt; DESTROYED releases all resources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a host as reported by its provider and certified data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostState {
    Building,
    Starting,
    Running,
    Stopping,
    Stopped,
    Paused,
    Crashed,
    Failed,
    Destroyed,
}

impl HostState {
    /// Whether the host can be brought back up (provider permitting).
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            HostState::Stopped | HostState::Paused | HostState::Crashed
        )
    }

    /// Whether the host is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HostState::Failed | HostState::Destroyed)
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostState::Building => "BUILDING",
            HostState::Starting => "STARTING",
            HostState::Running => "RUNNING",
            HostState::Stopping => "STOPPING",
            HostState::Stopped => "STOPPED",
            HostState::Paused => "PAUSED",
            HostState::Crashed => "CRASHED",
            HostState::Failed => "FAILED",
            HostState::Destroyed => "DESTROYED",
        };
        write!(f, "{}", s)
    }
}

/// Why a host is no longer running.
///
/// `Stopped` records a user-requested stop, `Paused` an idle-timeout stop.
/// A host that went down without either is treated as crashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    Stopped,
    Paused,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Stopped => write!(f, "STOPPED"),
            StopReason::Paused => write!(f, "PAUSED"),
        }
    }
}

/// Lifecycle state of an agent, derived from its terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentLifecycleState {
    /// No terminal session exists for this agent.
    Stopped,
    /// Session exists and the agent is actively working.
    Running,
    /// Session exists and the agent has signaled idleness.
    Waiting,
    /// Session exists but a newer agent has taken over the same name.
    Replaced,
}

impl AgentLifecycleState {
    /// Whether a message can be delivered in this state.
    ///
    /// Replaced agents still share a live session, so they accept messages
    /// exactly like running ones; only stopped agents must be started first.
    pub fn can_receive_messages(&self) -> bool {
        !matches!(self, AgentLifecycleState::Stopped)
    }
}

impl fmt::Display for AgentLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentLifecycleState::Stopped => "STOPPED",
            AgentLifecycleState::Running => "RUNNING",
            AgentLifecycleState::Waiting => "WAITING",
            AgentLifecycleState::Replaced => "REPLACED",
        };
        write!(f, "{}", s)
    }
}

/// Mode for deciding when a host counts as idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdleMode {
    #[default]
    Agent,
    Ssh,
    Disabled,
}

impl fmt::Display for IdleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleMode::Agent => write!(f, "AGENT"),
            IdleMode::Ssh => write!(f, "SSH"),
            IdleMode::Disabled => write!(f, "DISABLED"),
        }
    }
}

/// A file-mtime source that counts toward keeping a host active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivitySource {
    Agent,
    Ssh,
    Boot,
    Create,
    Start,
}

impl ActivitySource {
    /// Every source, in the order they are written to `data.json`.
    pub fn all() -> Vec<ActivitySource> {
        vec![
            ActivitySource::Agent,
            ActivitySource::Ssh,
            ActivitySource::Boot,
            ActivitySource::Create,
            ActivitySource::Start,
        ]
    }

    /// The activity file tracked for this source, relative to the host dir.
    pub fn activity_file(&self) -> &'static str {
        match self {
            ActivitySource::Agent => "activity/agent",
            ActivitySource::Ssh => "activity/ssh",
            ActivitySource::Boot => "activity/boot",
            ActivitySource::Create => "activity/create",
            ActivitySource::Start => "activity/start",
        }
    }
}

/// How fleet-wide operations react to per-target failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorBehavior {
    /// Raise on the first failure.
    Abort,
    /// Record the failure and keep going.
    #[default]
    Continue,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
