// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent cookie names, parsing, and Set-Cookie path scoping.
//!
//! Every agent gets its own session cookie (`sw_<name>`) scoped to
//! `/agents/<name>/`, so holding one agent's cookie grants nothing for the
//! others. Backend cookies are re-scoped the same way on the way out.

use axum::http::HeaderMap;

/// Session cookie name for an agent.
pub fn session_cookie_name(agent_name: &str) -> String {
    format!("sw_{}", agent_name)
}

/// Cookie the service-worker bootstrap sets once the worker is installed.
pub fn sw_installed_cookie_name(agent_name: &str) -> String {
    format!("sw_installed_{}", agent_name)
}

/// The path prefix all of an agent's traffic lives under.
pub fn agent_path_prefix(agent_name: &str) -> String {
    format!("/agents/{}", agent_name)
}

/// Parse a `Cookie` request header into name/value pairs.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Look up a cookie by name across all `Cookie` headers of a request.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(axum::http::header::COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for (cookie_name, value) in parse_cookie_header(header) {
            if cookie_name == name {
                return Some(value);
            }
        }
    }
    None
}

/// Rewrite the `Path` attribute of a `Set-Cookie` header so the cookie is
/// scoped under `/agents/<name>` instead of the backend's own root.
///
/// - `sid=abc; Path=/` becomes `sid=abc; Path=/agents/<name>/`
/// - `sid=abc; Path=/api` becomes `sid=abc; Path=/agents/<name>/api`
/// - `sid=abc` (no Path) gains `; Path=/agents/<name>/`
/// - an already-prefixed path is left alone (never double-prefixed)
pub fn rewrite_set_cookie_path(set_cookie: &str, agent_name: &str) -> String {
    let prefix = agent_path_prefix(agent_name);

    let mut parts: Vec<String> = Vec::new();
    let mut found_path = false;
    for part in set_cookie.split(';') {
        let trimmed = part.trim();
        let is_path_attribute = trimmed
            .split_once('=')
            .map(|(key, _)| key.trim().eq_ignore_ascii_case("path"))
            .unwrap_or(false);

        if is_path_attribute {
            found_path = true;
            // Unwrap is safe: is_path_attribute required an '='.
            let original = trimmed.split_once('=').map(|(_, v)| v.trim()).unwrap_or("");
            let rewritten = if original.starts_with(&prefix) {
                original.to_string()
            } else if original.starts_with('/') {
                format!("{}{}", prefix, original)
            } else {
                format!("{}/{}", prefix, original)
            };
            parts.push(format!("Path={}", rewritten));
        } else {
            parts.push(trimmed.to_string());
        }
    }

    if !found_path {
        parts.push(format!("Path={}/", prefix));
    }
    parts.join("; ")
}

#[cfg(test)]
#[path = "cookie_tests.rs"]
mod tests;
