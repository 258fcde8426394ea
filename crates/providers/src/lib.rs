// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Providers, hosts, agents, and the provisioning pipeline

pub mod agent;
pub mod connector;
pub mod host;
pub mod host_setup;
pub mod local;
pub mod offline_host;
pub mod paths;
pub mod provider;
pub mod provision;
pub mod watcher_script;

pub use agent::{destroy_agent, Agent, AgentRegistry, ProcessAgent, SkillAgent, TuiAgent};
pub use connector::{Connector, LocalConnector, SshConnector};
pub use host::{HostCommandRunner, OnlineHost};
pub use host_setup::prepare_host;
pub use local::LocalProvider;
pub use offline_host::OfflineHost;
pub use paths::HostPaths;
pub use provider::{HostHandle, Provider, ProviderRegistry};
pub use provision::{
    create_agent, provision_agent, HookRegistry, ProvisioningHooks,
};
