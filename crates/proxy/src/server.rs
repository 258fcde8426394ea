// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The forwarding server: routes, auth checks, and the proxy pipeline.
//!
//! `/agents/{name}/...` requests are authenticated with the per-agent
//! session cookie, resolved to a backend URL, and forwarded, after the
//! service-worker bootstrap dance for first navigations. Responses come
//! back with hop-by-hop headers stripped, cookies re-scoped under the
//! agent prefix, and a WebSocket shim injected into HTML.

use crate::assets;
use crate::auth::FileAuthStore;
use crate::cookie;
use crate::resolver::BackendResolver;
use crate::tunnel::SshTunnelManager;
use crate::upstream::{self, UpstreamError};
use axum::body::Body;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as AxumPath, Query, Request, State};
use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde::Deserialize;
use std::sync::Arc;

/// Server name used when the first path segment is not a known server.
const DEFAULT_SERVER_NAME: &str = "web";

/// WebSocket close codes for auth and resolution failures.
const WS_CLOSE_UNAUTHENTICATED: u16 = 4003;
const WS_CLOSE_UNKNOWN_BACKEND: u16 = 4004;
const WS_CLOSE_INTERNAL: u16 = 1011;

/// Maximum close-reason length forwarded to clients.
const CLOSE_REASON_MAX_CHARS: usize = 120;

/// Hop-by-hop headers never forwarded from backend responses.
///
/// Dropping `content-encoding` is safe because outbound requests force
/// `Accept-Encoding: identity`, so backend bodies arrive uncompressed.
const DROPPED_RESPONSE_HEADERS: [&str; 3] =
    ["transfer-encoding", "content-encoding", "content-length"];

/// Shared handles for every request.
pub struct ProxyState {
    pub auth: Arc<FileAuthStore>,
    pub resolver: Arc<dyn BackendResolver>,
    pub tunnels: Arc<SshTunnelManager>,
}

/// Build the forwarding server's router.
pub fn create_forwarding_server(state: ProxyState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/login", get(login))
        .route("/authenticate", get(authenticate))
        .route("/agents/{name}", any(proxy_root))
        .route("/agents/{name}/", any(proxy_root))
        .route("/agents/{name}/{*path}", any(proxy_path))
        .with_state(Arc::new(state))
}

/// Query parameters for `/login` and `/authenticate`.
///
/// The public parameter name is the legacy `changeling_name`; links already
/// issued to agents keep working.
#[derive(Debug, Deserialize)]
struct AuthQuery {
    #[serde(rename = "changeling_name")]
    agent_name: String,
    one_time_code: String,
}

/// Agent names whose session cookie in this request validates.
fn authenticated_agents(state: &ProxyState, headers: &HeaderMap) -> Vec<String> {
    let mut names = Vec::new();
    for header in headers.get_all(axum::http::header::COOKIE) {
        let Ok(header) = header.to_str() else { continue };
        for (cookie_name, value) in cookie::parse_cookie_header(header) {
            let Some(agent_name) = cookie_name.strip_prefix("sw_") else {
                continue;
            };
            if agent_name.starts_with("installed_") {
                continue;
            }
            if state.auth.is_session_valid(agent_name, &value)
                && !names.iter().any(|n| n == agent_name)
            {
                names.push(agent_name.to_string());
            }
        }
    }
    names.sort();
    names
}

fn is_authenticated(state: &ProxyState, headers: &HeaderMap, agent_name: &str) -> bool {
    cookie::get_cookie(headers, &cookie::session_cookie_name(agent_name))
        .map(|token| state.auth.is_session_valid(agent_name, &token))
        .unwrap_or(false)
}

async fn landing(State(state): State<Arc<ProxyState>>, headers: HeaderMap) -> Html<String> {
    let names = authenticated_agents(&state, &headers);
    Html(assets::landing_page_html(&names))
}

/// Browser-facing login: JS-redirects to `/authenticate` so the code is
/// consumed by a top-level fetch, or straight to `/` when this browser is
/// already authenticated (without spending the code).
async fn login(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Response {
    if is_authenticated(&state, &headers, &query.agent_name) {
        return redirect_response("/");
    }
    Html(assets::login_redirect_html(
        &query.agent_name,
        &query.one_time_code,
    ))
    .into_response()
}

async fn authenticate(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<AuthQuery>,
) -> Response {
    let consumed = match state
        .auth
        .consume_one_time_code(&query.agent_name, &query.one_time_code)
    {
        Ok(consumed) => consumed,
        Err(e) => {
            tracing::error!(error = %e, "auth store failure during authenticate");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !consumed {
        return (StatusCode::FORBIDDEN, Html(assets::invalid_code_html())).into_response();
    }

    let (token, _expires_at) = match state.auth.issue_session_token(&query.agent_name) {
        Ok(issued) => issued,
        Err(e) => {
            tracing::error!(error = %e, "failed to issue session token");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let prefix = cookie::agent_path_prefix(&query.agent_name);
    let cookie_value = format!(
        "{}={}; Path={}/; HttpOnly",
        cookie::session_cookie_name(&query.agent_name),
        token,
        prefix,
    );

    let mut response = redirect_response(&format!("{}/", prefix));
    if let Ok(value) = HeaderValue::from_str(&cookie_value) {
        response
            .headers_mut()
            .append(axum::http::header::SET_COOKIE, value);
    }
    response
}

fn redirect_response(location: &str) -> Response {
    let mut response = StatusCode::TEMPORARY_REDIRECT.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response
            .headers_mut()
            .insert(axum::http::header::LOCATION, value);
    }
    response
}

async fn proxy_root(
    State(state): State<Arc<ProxyState>>,
    AxumPath(name): AxumPath<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Response {
    proxy_entry(state, name, String::new(), ws.ok(), request).await
}

async fn proxy_path(
    State(state): State<Arc<ProxyState>>,
    AxumPath((name, path)): AxumPath<(String, String)>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Response {
    proxy_entry(state, name, path, ws.ok(), request).await
}

/// Close a WebSocket upgrade with a specific code instead of proxying.
fn ws_reject(ws: WebSocketUpgrade, code: u16, reason: &str) -> Response {
    let reason = truncate_chars(reason, CLOSE_REASON_MAX_CHARS);
    ws.on_upgrade(move |mut socket| async move {
        let _ = socket
            .send(WsMessage::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })))
            .await;
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

async fn proxy_entry(
    state: Arc<ProxyState>,
    name: String,
    path: String,
    ws: Option<WebSocketUpgrade>,
    request: Request,
) -> Response {
    // 1. Session cookie for this agent, else 403 / close 4003.
    if !is_authenticated(&state, request.headers(), &name) {
        return match ws {
            Some(ws) => ws_reject(ws, WS_CLOSE_UNAUTHENTICATED, "not authenticated"),
            None => (StatusCode::FORBIDDEN, "Not authenticated for this agent").into_response(),
        };
    }

    // 2. Resolve the backend. The first path segment may select a named
    //    server; otherwise the default server gets the whole path.
    let (first_segment, rest) = match path.split_once('/') {
        Some((first, rest)) => (first, rest.to_string()),
        None => (path.as_str(), String::new()),
    };

    let mut backend_path = path.clone();
    let mut backend_url = None;
    if !first_segment.is_empty() {
        if let Some(url) = state.resolver.get_backend_url(&name, first_segment).await {
            backend_url = Some(url);
            backend_path = rest;
        }
    }
    if backend_url.is_none() {
        backend_url = state.resolver.get_backend_url(&name, DEFAULT_SERVER_NAME).await;
    }
    let Some(backend_url) = backend_url else {
        return match ws {
            Some(ws) => ws_reject(ws, WS_CLOSE_UNKNOWN_BACKEND, "no backend for agent"),
            None => (StatusCode::BAD_GATEWAY, format!("No backend for agent {}", name))
                .into_response(),
        };
    };

    // 3. The service worker script itself.
    if backend_path == "__sw.js" && ws.is_none() {
        return (
            [(
                axum::http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/javascript"),
            )],
            assets::service_worker_js(&name),
        )
            .into_response();
    }

    // 4. First navigation without the installed cookie gets the bootstrap.
    let is_navigation = request
        .headers()
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        == Some("navigate");
    let sw_installed =
        cookie::get_cookie(request.headers(), &cookie::sw_installed_cookie_name(&name)).is_some();
    if ws.is_none() && is_navigation && !sw_installed {
        return Html(assets::bootstrap_html(&name)).into_response();
    }

    let ssh_info = state.resolver.get_ssh_info(&name).await;

    // 5. Proxy: WebSocket or plain HTTP.
    match ws {
        Some(ws) => {
            let query = request.uri().query().map(|q| q.to_string());
            ws.on_upgrade(move |socket| async move {
                proxy_websocket(state, name, backend_url, backend_path, query, ssh_info, socket)
                    .await;
            })
        }
        None => proxy_http(&state, &name, &backend_url, &backend_path, ssh_info, request).await,
    }
}

async fn proxy_http(
    state: &ProxyState,
    name: &str,
    backend_url: &str,
    backend_path: &str,
    ssh_info: Option<crate::resolver::RemoteSshInfo>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("failed to read body: {}", e))
                .into_response();
        }
    };

    let mut uri = format!("/{}", backend_path);
    if let Some(query) = parts.uri.query() {
        uri.push('?');
        uri.push_str(query);
    }

    let (backend_host, backend_port) = match upstream::parse_url_host_port(backend_url) {
        Ok(parsed) => parsed,
        Err(e) => return upstream_error_response(&e),
    };

    let mut builder = hyper::Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (header_name, value) in parts.headers.iter() {
            // The backend sees its own authority, not ours.
            if header_name == axum::http::header::HOST {
                continue;
            }
            // Responses are rewritten (cookie scoping, shim injection), so
            // the backend must not compress them.
            if header_name == axum::http::header::ACCEPT_ENCODING {
                continue;
            }
            headers.append(header_name.clone(), value.clone());
        }
        if let Ok(value) = HeaderValue::from_str(&format!("{}:{}", backend_host, backend_port)) {
            headers.insert(axum::http::header::HOST, value);
        }
        headers.insert(
            axum::http::header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );
    }

    let upstream_request = match builder.body(http_body_util::Full::new(body_bytes)) {
        Ok(request) => request,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("bad proxy request: {}", e))
                .into_response();
        }
    };

    let stream = match upstream::connect_backend(backend_url, ssh_info.as_ref(), &state.tunnels)
        .await
    {
        Ok(stream) => stream,
        Err(e) => return upstream_error_response(&e),
    };

    let backend_response = match upstream::send_request(stream, upstream_request).await {
        Ok(response) => response,
        Err(e) => return upstream_error_response(&e),
    };

    rewrite_backend_response(name, &parts.method, backend_response).await
}

fn upstream_error_response(error: &UpstreamError) -> Response {
    let status = match error {
        UpstreamError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, truncate_chars(&error.to_string(), CLOSE_REASON_MAX_CHARS)).into_response()
}

/// Strip hop-by-hop headers, rescope cookies, inject the WebSocket shim
/// into HTML, and hand the backend's response to the client.
async fn rewrite_backend_response(
    name: &str,
    method: &Method,
    backend_response: hyper::Response<hyper::body::Incoming>,
) -> Response {
    let (parts, body) = backend_response.into_parts();

    let mut headers = HeaderMap::new();
    for (header_name, value) in parts.headers.iter() {
        let lowered = header_name.as_str().to_ascii_lowercase();
        if DROPPED_RESPONSE_HEADERS.contains(&lowered.as_str()) {
            continue;
        }
        if lowered == "set-cookie" {
            // Handled below so multiple cookies survive individually.
            continue;
        }
        headers.append(header_name.clone(), value.clone());
    }
    for value in parts.headers.get_all(axum::http::header::SET_COOKIE) {
        if let Ok(raw) = value.to_str() {
            let rewritten = cookie::rewrite_set_cookie_path(raw, name);
            if let Ok(rewritten) = HeaderValue::from_str(&rewritten) {
                headers.append(axum::http::header::SET_COOKIE, rewritten);
            }
        }
    }

    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                truncate_chars(&e.to_string(), CLOSE_REASON_MAX_CHARS),
            )
                .into_response();
        }
    };

    let is_html = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/html"))
        .unwrap_or(false);

    let body = if is_html && *method != Method::HEAD {
        let html = String::from_utf8_lossy(&body_bytes);
        Body::from(assets::inject_websocket_shim(&html, name))
    } else {
        Body::from(body_bytes)
    };

    let mut response = Response::new(body);
    *response.status_mut() = parts.status;
    for (header_name, value) in headers.iter() {
        response
            .headers_mut()
            .append(HeaderName::from(header_name), value.clone());
    }
    response
}

/// Relay a WebSocket connection to the backend.
///
/// Two directions run concurrently; either side closing (or erroring)
/// terminates both.
async fn proxy_websocket(
    state: Arc<ProxyState>,
    name: String,
    backend_url: String,
    backend_path: String,
    query: Option<String>,
    ssh_info: Option<crate::resolver::RemoteSshInfo>,
    mut client: WebSocket,
) {
    let ws_scheme = if backend_url.starts_with("https://") {
        "wss"
    } else {
        "ws"
    };
    let (backend_host, backend_port) = match upstream::parse_url_host_port(&backend_url) {
        Ok(parsed) => parsed,
        Err(e) => {
            close_client(&mut client, WS_CLOSE_INTERNAL, &e.to_string()).await;
            return;
        }
    };
    let mut ws_url = format!(
        "{}://{}:{}/{}",
        ws_scheme, backend_host, backend_port, backend_path
    );
    if let Some(query) = query {
        ws_url.push('?');
        ws_url.push_str(&query);
    }

    let stream = match upstream::connect_backend(&backend_url, ssh_info.as_ref(), &state.tunnels)
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            close_client(&mut client, WS_CLOSE_INTERNAL, &e.to_string()).await;
            return;
        }
    };

    // A fresh handshake, not the client's headers: no Accept-Encoding or
    // compression extensions are offered to the backend.
    let backend = match tokio_tungstenite::client_async(ws_url.as_str(), stream).await {
        Ok((backend, _response)) => backend,
        Err(e) => {
            tracing::warn!(agent = %name, error = %e, "backend websocket connect failed");
            close_client(&mut client, WS_CLOSE_INTERNAL, &e.to_string()).await;
            return;
        }
    };

    let (mut client_sink, mut client_stream) = client.split();
    let (mut backend_sink, mut backend_stream) = backend.split();

    loop {
        tokio::select! {
            from_client = client_stream.next() => {
                match from_client {
                    Some(Ok(WsMessage::Text(text))) => {
                        if backend_sink
                            .send(tokio_tungstenite::tungstenite::Message::text(
                                text.to_string(),
                            ))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        if backend_sink
                            .send(tokio_tungstenite::tungstenite::Message::binary(
                                bytes.to_vec(),
                            ))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                        let _ = backend_sink
                            .send(tokio_tungstenite::tungstenite::Message::Close(None))
                            .await;
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong handled by the stacks
                }
            }
            from_backend = backend_stream.next() => {
                match from_backend {
                    Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                        if client_sink
                            .send(WsMessage::Text(text.to_string().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(tokio_tungstenite::tungstenite::Message::Binary(bytes))) => {
                        if client_sink
                            .send(WsMessage::Binary(bytes.to_vec().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(tokio_tungstenite::tungstenite::Message::Close(_)))
                    | Some(Err(_))
                    | None => {
                        let _ = client_sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn close_client(client: &mut WebSocket, code: u16, reason: &str) {
    let _ = client
        .send(WsMessage::Close(Some(CloseFrame {
            code,
            reason: truncate_chars(reason, CLOSE_REASON_MAX_CHARS).into(),
        })))
        .await;
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
