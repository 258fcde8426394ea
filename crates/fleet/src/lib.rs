// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Fleet-wide operations: listing, messaging, exec, lifecycle, enforcement

pub mod enforce;
pub mod exec;
pub mod lifecycle;
pub mod list;
pub mod message;

#[cfg(test)]
mod test_fixtures;

pub use enforce::{enforce, enforce_watch, EnforceAction, EnforceOptions, EnforceResult};
pub use exec::{exec_on_agents, ExecResult};
pub use lifecycle::{ensure_agent_started, ensure_host_started};
pub use list::{load_all_agents_grouped_by_host, FleetContext};
pub use message::{send_message_to_agents, MessageOptions, MessageResult};
