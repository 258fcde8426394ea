// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forwarding server daemon.
//!
//! Environment:
//! - `MNG_PROXY_ADDR`  listen address (default `127.0.0.1:8100`)
//! - `MNG_PROXY_DATA`  data directory for the auth store (default `~/.mng/proxy`)
//! - `MNG_BINARY`      fleet CLI the backend resolver shells out to

use mng_proxy::russh_transport::RusshFactory;
use mng_proxy::{
    create_forwarding_server, CliBackendResolver, FileAuthStore, ProxyState, SshTunnelManager,
    SubprocessMngCli,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn data_directory() -> std::path::PathBuf {
    match std::env::var("MNG_PROXY_DATA") {
        Ok(dir) => dir.into(),
        Err(_) => dirs_fallback().join("proxy"),
    }
}

fn dirs_fallback() -> std::path::PathBuf {
    std::env::var("HOME")
        .map(|home| std::path::PathBuf::from(home).join(".mng"))
        .unwrap_or_else(|_| std::path::PathBuf::from(".mng"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("MNG_PROXY_ADDR").unwrap_or_else(|_| "127.0.0.1:8100".to_string());
    let binary = std::env::var("MNG_BINARY")
        .unwrap_or_else(|_| mng_core::config::DEFAULT_CLI_BINARY.to_string());

    let state = ProxyState {
        auth: Arc::new(FileAuthStore::new(data_directory().join("auth"))),
        resolver: Arc::new(CliBackendResolver::new(Box::new(SubprocessMngCli::new(
            binary,
        )))),
        tunnels: Arc::new(SshTunnelManager::new(Arc::new(RusshFactory::new()))),
    };

    let router = create_forwarding_server(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr, "forwarding server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
