// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH tunnels to remote agent backends, exposed as local Unix sockets.
//!
//! For each unique SSH destination one transport connection is kept; for
//! each `(destination, remote_host, remote_port)` triple a Unix socket is
//! created in a private directory (mode 0700, random name). Connections
//! accepted on the socket are relayed over an SSH direct-tcpip channel to
//! the remote endpoint.
//!
//! Other users cannot reach the sockets, and same-user processes would
//! have to discover the randomly generated directory path first.

use crate::resolver::RemoteSshInfo;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Relay buffer size per direction.
const BUFFER_SIZE: usize = 65536;

/// How long to wait for the tunnel socket file to appear.
const SOCKET_APPEAR_TIMEOUT: Duration = Duration::from_secs(2);

const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// SSH connect timeout (enforced by transport factories).
pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raised when an SSH tunnel operation fails.
#[derive(Debug, Error)]
pub enum SshTunnelError {
    #[error("SSH connection to {destination} failed: {reason}")]
    Connect { destination: String, reason: String },
    #[error("failed to open SSH channel to {host}:{port}: {reason}")]
    ChannelOpen {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("SSH tunnel socket did not appear within {timeout:?} at {path}")]
    SocketTimeout { path: PathBuf, timeout: Duration },
    #[error("tunnel IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bidirectional byte stream through an SSH channel.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> TunnelStream for T {}

/// One established SSH connection that can open direct-tcpip channels.
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    async fn open_channel(
        &self,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn TunnelStream>, SshTunnelError>;

    /// Whether the underlying connection is still usable.
    fn is_active(&self) -> bool;
}

/// Creates transport connections; the production factory speaks SSH, test
/// factories return in-process fakes.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        ssh_info: &RemoteSshInfo,
    ) -> Result<Arc<dyn TunnelTransport>, SshTunnelError>;
}

struct TunnelEntry {
    socket_path: PathBuf,
    accept_task: JoinHandle<()>,
}

/// Manages SSH connections and their tunnel sockets.
pub struct SshTunnelManager {
    factory: Arc<dyn TransportFactory>,
    tmpdir: tokio::sync::Mutex<Option<tempfile::TempDir>>,
    connections: tokio::sync::Mutex<HashMap<String, Arc<dyn TunnelTransport>>>,
    tunnels: tokio::sync::Mutex<HashMap<String, TunnelEntry>>,
    shutdown: CancellationToken,
}

fn connection_key(ssh_info: &RemoteSshInfo) -> String {
    format!("{}:{}", ssh_info.host, ssh_info.port)
}

fn tunnel_key(ssh_info: &RemoteSshInfo, remote_host: &str, remote_port: u16) -> String {
    format!(
        "{}:{}->{}:{}",
        ssh_info.host, ssh_info.port, remote_host, remote_port
    )
}

impl SshTunnelManager {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            tmpdir: tokio::sync::Mutex::new(None),
            connections: tokio::sync::Mutex::new(HashMap::new()),
            tunnels: tokio::sync::Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// The private socket directory, created on first use with mode 0700.
    async fn tmpdir_path(&self) -> Result<PathBuf, SshTunnelError> {
        let mut guard = self.tmpdir.lock().await;
        if guard.is_none() {
            let dir = tempfile::Builder::new().prefix("mng-tunnel-").tempdir()?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
            }
            *guard = Some(dir);
        }
        // The guard holds Some by construction above.
        Ok(guard
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .unwrap_or_default())
    }

    /// Reuse the cached connection while its transport is active.
    async fn get_or_create_connection(
        &self,
        ssh_info: &RemoteSshInfo,
    ) -> Result<Arc<dyn TunnelTransport>, SshTunnelError> {
        let key = connection_key(ssh_info);
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(&key) {
            if existing.is_active() {
                return Ok(existing.clone());
            }
        }

        tracing::info!(host = %ssh_info.host, port = ssh_info.port, "establishing SSH connection");
        let transport = self.factory.connect(ssh_info).await?;
        connections.insert(key, transport.clone());
        Ok(transport)
    }

    /// Get or create a Unix socket tunneling to `(remote_host, remote_port)`
    /// on the host identified by `ssh_info`.
    pub async fn get_tunnel_socket_path(
        &self,
        ssh_info: &RemoteSshInfo,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<PathBuf, SshTunnelError> {
        let key = tunnel_key(ssh_info, remote_host, remote_port);
        let mut tunnels = self.tunnels.lock().await;

        if let Some(entry) = tunnels.get(&key) {
            if !entry.accept_task.is_finished() {
                return Ok(entry.socket_path.clone());
            }
        }

        let transport = self.get_or_create_connection(ssh_info).await?;
        let socket_name = format!("tunnel-{}.sock", key.replace([':', '>'], "-"));
        let socket_path = self.tmpdir_path().await?.join(socket_name);
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        let accept_task = tokio::spawn(tunnel_accept_loop(
            socket_path.clone(),
            transport,
            remote_host.to_string(),
            remote_port,
            self.shutdown.clone(),
        ));

        wait_for_socket(&socket_path).await?;

        tunnels.insert(
            key,
            TunnelEntry {
                socket_path: socket_path.clone(),
                accept_task,
            },
        );
        Ok(socket_path)
    }

    /// Shut down all tunnels and connections and remove the socket dir.
    pub async fn cleanup(&self) {
        self.shutdown.cancel();

        let mut tunnels = self.tunnels.lock().await;
        for (key, entry) in tunnels.drain() {
            if tokio::time::timeout(Duration::from_secs(5), entry.accept_task)
                .await
                .is_err()
            {
                tracing::warn!(tunnel = %key, "accept loop did not stop in time");
            }
        }

        self.connections.lock().await.clear();
        *self.tmpdir.lock().await = None;
    }
}

async fn wait_for_socket(socket_path: &Path) -> Result<(), SshTunnelError> {
    let deadline = tokio::time::Instant::now() + SOCKET_APPEAR_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if socket_path.exists() {
            return Ok(());
        }
        tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
    }
    Err(SshTunnelError::SocketTimeout {
        path: socket_path.to_path_buf(),
        timeout: SOCKET_APPEAR_TIMEOUT,
    })
}

/// Accept connections on the Unix socket and relay each over a fresh
/// direct-tcpip channel.
async fn tunnel_accept_loop(
    socket_path: PathBuf,
    transport: Arc<dyn TunnelTransport>,
    remote_host: String,
    remote_port: u16,
    shutdown: CancellationToken,
) {
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(path = %socket_path.display(), error = %e, "failed to bind tunnel socket");
            return;
        }
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600));
    }

    loop {
        let client = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "tunnel accept failed");
                    break;
                }
            },
        };

        let channel = match transport.open_channel(&remote_host, remote_port).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(
                    remote_host,
                    remote_port,
                    error = %e,
                    "failed to open SSH channel"
                );
                continue;
            }
        };

        tokio::spawn(relay_data(client, channel, shutdown.clone()));
    }

    let _ = std::fs::remove_file(&socket_path);
}

/// Relay bytes both ways until either side closes or shutdown is signaled.
async fn relay_data(
    mut client: UnixStream,
    mut channel: Box<dyn TunnelStream>,
    shutdown: CancellationToken,
) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = tokio::io::copy_bidirectional_with_sizes(
            &mut client,
            &mut channel,
            BUFFER_SIZE,
            BUFFER_SIZE,
        ) => {
            if let Err(e) = result {
                tracing::trace!(error = %e, "tunnel relay ended");
            }
        }
    }
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tests;
