// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service-worker bootstrap flow: one-time-code login, first navigation,
//! then a proxied request through the installed worker's cookie.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use mng_proxy::{
    create_forwarding_server, FileAuthStore, ProxyState, SshTunnelManager, StaticBackendResolver,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower::util::ServiceExt;

struct NoSshFactory;

#[async_trait::async_trait]
impl mng_proxy::TransportFactory for NoSshFactory {
    async fn connect(
        &self,
        ssh_info: &mng_proxy::RemoteSshInfo,
    ) -> Result<Arc<dyn mng_proxy::TunnelTransport>, mng_proxy::SshTunnelError> {
        Err(mng_proxy::SshTunnelError::Connect {
            destination: ssh_info.host.clone(),
            reason: "unused".to_string(),
        })
    }
}

async fn spawn_backend() -> u16 {
    let app = Router::new()
        .route(
            "/",
            get(|| async { Html("<html><head></head><body>agent ui</body></html>") }),
        )
        .route(
            "/api/status",
            get(|| async {
                (
                    [(axum::http::header::SET_COOKIE, "sid=abc; Path=/")],
                    "backend-status-ok",
                )
                    .into_response()
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

#[tokio::test]
async fn login_bootstrap_and_proxied_request() {
    let port = spawn_backend().await;
    let auth_dir = tempfile::tempdir().unwrap();
    let auth = Arc::new(FileAuthStore::new(auth_dir.path().join("auth")));

    let mut urls = HashMap::new();
    urls.insert("alpha".to_string(), {
        let mut servers = HashMap::new();
        servers.insert("web".to_string(), format!("http://127.0.0.1:{}", port));
        servers
    });

    let router = create_forwarding_server(ProxyState {
        auth: auth.clone(),
        resolver: Arc::new(StaticBackendResolver::new(urls)),
        tunnels: Arc::new(SshTunnelManager::new(Arc::new(NoSshFactory))),
    });

    // Authenticate with a one-time code; the session cookie comes back
    // scoped to this agent's path.
    auth.add_one_time_code("alpha", "AAA").unwrap();
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/authenticate?changeling_name=alpha&one_time_code=AAA")
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
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("sw_alpha="));
    assert!(set_cookie.contains("Path=/agents/alpha/"));
    let session_cookie = set_cookie.split(';').next().unwrap().to_string();

    // First navigation: no installed cookie yet, so the bootstrap page
    // registers the service worker.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/agents/alpha/")
                .header(axum::http::header::COOKIE, &session_cookie)
                .header("sec-fetch-mode", "navigate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("serviceWorker.register"));

    // With the worker installed, requests proxy straight through and any
    // backend cookies come back rescoped.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/agents/alpha/api/status")
                .header(
                    axum::http::header::COOKIE,
                    format!("{}; sw_installed_alpha=1", session_cookie),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(axum::http::header::SET_COOKIE)
            .unwrap(),
        "sid=abc; Path=/agents/alpha/"
    );
    assert_eq!(body_text(response).await, "backend-status-ok");
}

#[tokio::test]
async fn code_is_single_use_across_the_flow() {
    let auth_dir = tempfile::tempdir().unwrap();
    let auth = Arc::new(FileAuthStore::new(auth_dir.path().join("auth")));
    let router = create_forwarding_server(ProxyState {
        auth: auth.clone(),
        resolver: Arc::new(StaticBackendResolver::new(HashMap::new())),
        tunnels: Arc::new(SshTunnelManager::new(Arc::new(NoSshFactory))),
    });

    auth.add_one_time_code("alpha", "ONCE").unwrap();

    let first = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/authenticate?changeling_name=alpha&one_time_code=ONCE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::TEMPORARY_REDIRECT);

    let second = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/authenticate?changeling_name=alpha&one_time_code=ONCE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
}
