// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection-level HTTP client for proxied requests.
//!
//! Backends are plain TCP for local agents, or the tunnel manager's Unix
//! sockets for remote ones. Driving hyper at the connection level lets the
//! same request path ride either stream; WebSocket upgrades reuse the same
//! connect logic with a tungstenite client on top.

use crate::resolver::RemoteSshInfo;
use crate::tunnel::{SshTunnelManager, TunnelStream};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, UnixStream};

/// Backend response timeout; expiry maps to 504.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid backend url: {0}")]
    BadUrl(String),
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend request failed: {0}")]
    Request(String),
}

/// Extract `(host, port)` from a backend URL, defaulting the port from the
/// scheme (80 for http, 443 for https).
pub fn parse_url_host_port(url: &str) -> Result<(String, u16), UpstreamError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| UpstreamError::BadUrl(url.to_string()))?;
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    if authority.is_empty() {
        return Err(UpstreamError::BadUrl(url.to_string()));
    }

    let default_port = if scheme == "https" { 443 } else { 80 };
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| UpstreamError::BadUrl(url.to_string()))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), default_port)),
    }
}

/// Open a byte stream to the backend named by `url`.
///
/// Remote backends (non-`None` ssh info) are reached through a tunnel
/// socket; the `(host, port)` from the URL become the tunnel's remote
/// endpoint.
pub async fn connect_backend(
    url: &str,
    ssh_info: Option<&RemoteSshInfo>,
    tunnels: &SshTunnelManager,
) -> Result<Box<dyn TunnelStream>, UpstreamError> {
    let (host, port) = parse_url_host_port(url)?;

    match ssh_info {
        Some(ssh_info) => {
            let socket_path = tunnels
                .get_tunnel_socket_path(ssh_info, &host, port)
                .await
                .map_err(|e| UpstreamError::Unreachable(e.to_string()))?;
            let stream = UnixStream::connect(&socket_path)
                .await
                .map_err(|e| UpstreamError::Unreachable(e.to_string()))?;
            Ok(Box::new(stream))
        }
        None => {
            let stream = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| UpstreamError::Unreachable(e.to_string()))?;
            Ok(Box::new(stream))
        }
    }
}

/// Send one HTTP/1.1 request over a fresh backend connection.
pub async fn send_request(
    stream: Box<dyn TunnelStream>,
    request: hyper::Request<Full<Bytes>>,
) -> Result<hyper::Response<hyper::body::Incoming>, UpstreamError> {
    let io = TokioIo::new(stream);
    let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| UpstreamError::Unreachable(e.to_string()))?;

    // The connection task finishes when the response body is done.
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "backend connection ended with error");
        }
    });

    match tokio::time::timeout(BACKEND_TIMEOUT, sender.send_request(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(UpstreamError::Request(e.to_string())),
        Err(_) => Err(UpstreamError::Timeout(BACKEND_TIMEOUT)),
    }
}

#[cfg(test)]
#[path = "upstream_tests.rs"]
mod tests;
