// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The forwarding server: one authenticated reverse proxy for every agent's
//! HTTP servers, with SSH tunneling to remote hosts

pub mod assets;
pub mod auth;
pub mod cookie;
pub mod resolver;
pub mod russh_transport;
pub mod server;
pub mod tunnel;
pub mod upstream;

pub use auth::FileAuthStore;
pub use resolver::{
    BackendResolver, CliBackendResolver, MngCli, RemoteSshInfo, StaticBackendResolver,
    SubprocessMngCli,
};
pub use server::{create_forwarding_server, ProxyState};
pub use tunnel::{SshTunnelError, SshTunnelManager, TransportFactory, TunnelTransport};
