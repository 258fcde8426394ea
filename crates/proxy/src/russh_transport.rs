// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production SSH transport for the tunnel manager, built on russh.
//!
//! Host keys are verified against the `known_hosts` file stored next to
//! the provider's SSH key when one exists; otherwise the key is accepted
//! with a warning (first-contact hosts created by the fleet manager have
//! no prior entry).

use crate::resolver::RemoteSshInfo;
use crate::tunnel::{
    SshTunnelError, TransportFactory, TunnelStream, TunnelTransport, SSH_CONNECT_TIMEOUT,
};
use async_trait::async_trait;
use russh::client;
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg};
use std::path::PathBuf;
use std::sync::Arc;

struct HostKeyPolicy {
    host: String,
    port: u16,
    known_hosts_path: Option<PathBuf>,
}

impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.known_hosts_path {
            Some(path) => {
                let known = russh::keys::check_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    path,
                )?;
                if !known {
                    tracing::error!(
                        host = %self.host,
                        "server key does not match known_hosts entry, rejecting"
                    );
                }
                Ok(known)
            }
            None => {
                tracing::warn!(
                    host = %self.host,
                    "no known_hosts file next to the SSH key, accepting server key"
                );
                Ok(true)
            }
        }
    }
}

/// One russh client session.
pub struct RusshTransport {
    handle: client::Handle<HostKeyPolicy>,
}

#[async_trait]
impl TunnelTransport for RusshTransport {
    async fn open_channel(
        &self,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn TunnelStream>, SshTunnelError> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(remote_host, remote_port as u32, "127.0.0.1", 0)
            .await
            .map_err(|e| SshTunnelError::ChannelOpen {
                host: remote_host.to_string(),
                port: remote_port,
                reason: e.to_string(),
            })?;
        Ok(Box::new(channel.into_stream()))
    }

    fn is_active(&self) -> bool {
        !self.handle.is_closed()
    }
}

/// Connects russh sessions using the per-provider key material.
#[derive(Debug, Clone, Default)]
pub struct RusshFactory;

impl RusshFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for RusshFactory {
    async fn connect(
        &self,
        ssh_info: &RemoteSshInfo,
    ) -> Result<Arc<dyn TunnelTransport>, SshTunnelError> {
        let destination = format!("{}:{}", ssh_info.host, ssh_info.port);
        let connect_error = |reason: String| SshTunnelError::Connect {
            destination: destination.clone(),
            reason,
        };

        let key = load_secret_key(&ssh_info.key_path, None)
            .map_err(|e| connect_error(format!("failed to load key: {}", e)))?;

        // The fleet stores each provider's known_hosts next to its key.
        let known_hosts_path = ssh_info
            .key_path
            .parent()
            .map(|dir| dir.join("known_hosts"))
            .filter(|path| path.exists());

        let policy = HostKeyPolicy {
            host: ssh_info.host.clone(),
            port: ssh_info.port,
            known_hosts_path,
        };

        let config = Arc::new(client::Config::default());
        let handle = tokio::time::timeout(
            SSH_CONNECT_TIMEOUT,
            client::connect(config, (ssh_info.host.as_str(), ssh_info.port), policy),
        )
        .await
        .map_err(|_| connect_error(format!("timed out after {:?}", SSH_CONNECT_TIMEOUT)))?
        .map_err(|e| connect_error(e.to_string()))?;

        let mut handle = handle;
        let auth = handle
            .authenticate_publickey(
                &ssh_info.user,
                PrivateKeyWithHashAlg::new(Arc::new(key), None),
            )
            .await
            .map_err(|e| connect_error(format!("authentication error: {}", e)))?;
        if !matches!(auth, client::AuthResult::Success) {
            return Err(connect_error(
                "public key authentication rejected".to_string(),
            ));
        }

        Ok(Arc::new(RusshTransport { handle }))
    }
}
