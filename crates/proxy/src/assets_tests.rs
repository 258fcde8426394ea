// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn bootstrap_registers_worker_and_sets_cookie() {
    let html = bootstrap_html("alpha");
    assert!(html.contains("serviceWorker.register"));
    assert!(html.contains("sw_installed_alpha=1"));
    assert!(html.contains("'/agents/alpha/'"));
    assert!(html.contains("location.reload()"));
}

#[test]
fn service_worker_rewrites_unprefixed_same_origin_paths() {
    let js = service_worker_js("alpha");
    assert!(js.contains("const PREFIX = '/agents/alpha'"));
    assert!(js.contains("skipWaiting"));
    assert!(js.contains("url.origin !== location.origin"));
    assert!(js.contains("__sw.js"));
}

#[test]
fn shim_injects_after_plain_head() {
    let html = "<html><head><title>t</title></head><body></body></html>";
    let injected = inject_websocket_shim(html, "alpha");
    let head_end = injected.find("<head>").unwrap() + "<head>".len();
    assert!(injected[head_end..].starts_with("<script>"));
    assert!(injected.contains("OrigWebSocket"));
}

#[test]
fn shim_injects_after_head_with_attributes() {
    let html = r#"<html><head lang="en"><title>t</title></head></html>"#;
    let injected = inject_websocket_shim(html, "alpha");
    let marker = r#"<head lang="en">"#;
    let head_end = injected.find(marker).unwrap() + marker.len();
    assert!(injected[head_end..].starts_with("<script>"));
}

#[test]
fn shim_prepends_when_no_head_exists() {
    let html = "<body>plain</body>";
    let injected = inject_websocket_shim(html, "alpha");
    assert!(injected.starts_with("<script>"));
    assert!(injected.ends_with("<body>plain</body>"));
}

#[test]
fn landing_page_lists_agents_or_empty_state() {
    let empty = landing_page_html(&[]);
    assert!(empty.contains("No agents are accessible"));

    let listed = landing_page_html(&["alpha".to_string(), "beta".to_string()]);
    assert!(listed.contains("href=\"/agents/alpha/\""));
    assert!(listed.contains("href=\"/agents/beta/\""));
}

#[test]
fn login_page_redirects_via_javascript() {
    let html = login_redirect_html("alpha", "code-123");
    assert!(html.contains("window.location.href"));
    assert!(html.contains("/authenticate?changeling_name=alpha&one_time_code=code-123"));
}
