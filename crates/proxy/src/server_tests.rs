// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::resolver::StaticBackendResolver;
use crate::tunnel::{SshTunnelError, TransportFactory, TunnelTransport};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::Request as HttpRequest;
use axum::routing::post;
use axum::Json;
use std::collections::HashMap;
use tower::util::ServiceExt;

/// Factory for tests that never reach SSH.
struct UnreachableFactory;

#[async_trait]
impl TransportFactory for UnreachableFactory {
    async fn connect(
        &self,
        ssh_info: &crate::resolver::RemoteSshInfo,
    ) -> Result<Arc<dyn TunnelTransport>, SshTunnelError> {
        Err(SshTunnelError::Connect {
            destination: ssh_info.host.clone(),
            reason: "no ssh in tests".to_string(),
        })
    }
}

async fn spawn_backend() -> u16 {
    let app = Router::new()
        .route(
            "/",
            get(|| async {
                Html(
                    "<html><head><title>Backend</title></head>\
                     <body>Hello from backend</body></html>",
                )
            }),
        )
        .route(
            "/api/status",
            get(|| async {
                (
                    [(axum::http::header::SET_COOKIE, "sid=abc; Path=/")],
                    Json(serde_json::json!({"status": "ok"})),
                )
            }),
        )
        .route(
            "/api/echo",
            post(|body: Bytes| async move { body }),
        )
        .route(
            "/api/encoding",
            get(|headers: HeaderMap| async move {
                headers
                    .get(axum::http::header::ACCEPT_ENCODING)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("<absent>")
                    .to_string()
            }),
        )
        .route(
            "/api/two-cookies",
            get(|| async {
                let mut response = "ok".into_response();
                response.headers_mut().append(
                    axum::http::header::SET_COOKIE,
                    HeaderValue::from_static("first=1; Path=/"),
                );
                response.headers_mut().append(
                    axum::http::header::SET_COOKIE,
                    HeaderValue::from_static("second=2"),
                );
                response
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

struct TestServer {
    router: Router,
    auth: Arc<FileAuthStore>,
    _auth_dir: tempfile::TempDir,
}

async fn test_server_with_urls(urls: HashMap<String, HashMap<String, String>>) -> TestServer {
    let auth_dir = tempfile::tempdir().unwrap();
    let auth = Arc::new(FileAuthStore::new(auth_dir.path().join("auth")));
    let state = ProxyState {
        auth: auth.clone(),
        resolver: Arc::new(StaticBackendResolver::new(urls)),
        tunnels: Arc::new(SshTunnelManager::new(Arc::new(UnreachableFactory))),
    };
    TestServer {
        router: create_forwarding_server(state),
        auth,
        _auth_dir: auth_dir,
    }
}

async fn test_server_for(agent: &str) -> TestServer {
    let port = spawn_backend().await;
    let mut urls = HashMap::new();
    urls.insert(agent.to_string(), {
        let mut servers = HashMap::new();
        servers.insert("web".to_string(), format!("http://127.0.0.1:{}", port));
        servers
    });
    test_server_with_urls(urls).await
}

/// Authenticate and return the session cookie pair `sw_<agent>=<token>`.
async fn authenticate_for(server: &TestServer, agent: &str) -> String {
    let code = format!("code-{}", uuid::Uuid::new_v4().simple());
    server.auth.add_one_time_code(agent, &code).unwrap();

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri(format!(
                    "/authenticate?changeling_name={}&one_time_code={}",
                    agent, code
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let set_cookie = response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

#[tokio::test]
async fn landing_page_shows_empty_state_without_cookies() {
    let server = test_server_for("alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("No agents are accessible"));
}

#[tokio::test]
async fn login_redirects_to_authenticate_via_js() {
    let server = test_server_for("alpha").await;
    server.auth.add_one_time_code("alpha", "login-code").unwrap();

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/login?changeling_name=alpha&one_time_code=login-code")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("window.location.href"));
    assert!(body.contains("/authenticate"));
}

#[tokio::test]
async fn login_redirects_home_when_already_authenticated() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;
    server.auth.add_one_time_code("alpha", "second-code").unwrap();

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/login?changeling_name=alpha&one_time_code=second-code")
                .header(axum::http::header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(axum::http::header::LOCATION).unwrap(),
        "/"
    );
    // The unused code is not consumed by a login while authenticated.
    assert!(server.auth.consume_one_time_code("alpha", "second-code").unwrap());
}

#[tokio::test]
async fn authenticate_sets_scoped_cookie_and_redirects() {
    let server = test_server_for("alpha").await;
    server.auth.add_one_time_code("alpha", "auth-code").unwrap();

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/authenticate?changeling_name=alpha&one_time_code=auth-code")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(axum::http::header::LOCATION).unwrap(),
        "/agents/alpha/"
    );
    let set_cookie = response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("sw_alpha="));
    assert!(set_cookie.contains("Path=/agents/alpha/"));
}

#[tokio::test]
async fn authenticate_with_invalid_code_returns_403() {
    let server = test_server_for("alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/authenticate?changeling_name=alpha&one_time_code=bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response)
        .await
        .contains("invalid or has already been used"));
}

#[tokio::test]
async fn one_time_code_cannot_be_reused() {
    let server = test_server_for("alpha").await;
    server.auth.add_one_time_code("alpha", "once").unwrap();

    let first = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/authenticate?changeling_name=alpha&one_time_code=once")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::TEMPORARY_REDIRECT);

    let second = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/authenticate?changeling_name=alpha&one_time_code=once")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn landing_page_lists_agent_after_authentication() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/")
                .header(axum::http::header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(body_text(response).await.contains("alpha"));
}

#[tokio::test]
async fn proxy_rejects_unauthenticated_requests() {
    let server = test_server_for("alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/alpha/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn first_navigation_serves_bootstrap() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/alpha/")
                .header(axum::http::header::COOKIE, &cookie)
                .header("sec-fetch-mode", "navigate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("serviceWorker.register"));
}

#[tokio::test]
async fn serves_service_worker_script() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/alpha/__sw.js")
                .header(axum::http::header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .unwrap(),
        "application/javascript"
    );
    assert!(body_text(response).await.contains("skipWaiting"));
}

#[tokio::test]
async fn forwards_get_and_rescopes_cookies() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/alpha/api/status")
                .header(
                    axum::http::header::COOKIE,
                    format!("{}; sw_installed_alpha=1", cookie),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(set_cookie, "sid=abc; Path=/agents/alpha/");

    let body = body_text(response).await;
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).unwrap(),
        serde_json::json!({"status": "ok"})
    );
}

#[tokio::test]
async fn forwards_post_bodies() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .method("POST")
                .uri("/agents/alpha/api/echo")
                .header(
                    axum::http::header::COOKIE,
                    format!("{}; sw_installed_alpha=1", cookie),
                )
                .body(Body::from("test-body-content"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "test-body-content");
}

#[tokio::test]
async fn injects_websocket_shim_into_html() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/alpha/")
                .header(
                    axum::http::header::COOKIE,
                    format!("{}; sw_installed_alpha=1", cookie),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("OrigWebSocket"));
    assert!(body.contains("Hello from backend"));
}

#[tokio::test]
async fn backend_requests_force_identity_encoding() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;

    // The browser offers compression, but the proxy rewrites response
    // bodies, so the backend must see identity only.
    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/alpha/api/encoding")
                .header(axum::http::header::ACCEPT_ENCODING, "gzip, deflate, br")
                .header(
                    axum::http::header::COOKIE,
                    format!("{}; sw_installed_alpha=1", cookie),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "identity");
}

#[tokio::test]
async fn multiple_set_cookie_headers_are_preserved() {
    let server = test_server_for("alpha").await;
    let cookie = authenticate_for(&server, "alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/alpha/api/two-cookies")
                .header(
                    axum::http::header::COOKIE,
                    format!("{}; sw_installed_alpha=1", cookie),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let cookies: Vec<String> = response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(
        cookies,
        vec![
            "first=1; Path=/agents/alpha/".to_string(),
            "second=2; Path=/agents/alpha/".to_string(),
        ]
    );
}

#[tokio::test]
async fn unknown_agent_is_a_bad_gateway() {
    let server = test_server_with_urls(HashMap::new()).await;
    let cookie = authenticate_for(&server, "ghost").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/ghost/")
                .header(axum::http::header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn unreachable_backend_is_a_bad_gateway() {
    // Point at a port nothing listens on.
    let mut urls = HashMap::new();
    urls.insert("alpha".to_string(), {
        let mut servers = HashMap::new();
        servers.insert("web".to_string(), "http://127.0.0.1:1".to_string());
        servers
    });
    let server = test_server_with_urls(urls).await;
    let cookie = authenticate_for(&server, "alpha").await;

    let response = server
        .router
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/agents/alpha/api/status")
                .header(
                    axum::http::header::COOKIE,
                    format!("{}; sw_installed_alpha=1", cookie),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
