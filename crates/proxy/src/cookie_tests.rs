// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    root_path = { "sid=abc; Path=/", "sid=abc; Path=/agents/alpha/" },
    sub_path = { "sid=abc; Path=/api", "sid=abc; Path=/agents/alpha/api" },
    no_path = { "sid=abc", "sid=abc; Path=/agents/alpha/" },
    already_prefixed = { "sid=abc; Path=/agents/alpha/", "sid=abc; Path=/agents/alpha/" },
    lowercase_attr = { "sid=abc; path=/", "sid=abc; Path=/agents/alpha/" },
    other_attrs_kept = {
        "sid=abc; HttpOnly; Path=/; Secure",
        "sid=abc; HttpOnly; Path=/agents/alpha/; Secure"
    },
)]
fn set_cookie_paths_are_scoped(input: &str, expected: &str) {
    assert_eq!(rewrite_set_cookie_path(input, "alpha"), expected);
}

#[test]
fn cookie_header_parsing() {
    let cookies = parse_cookie_header("sw_alpha=tok; sw_installed_alpha=1; other=x");
    assert_eq!(
        cookies,
        vec![
            ("sw_alpha".to_string(), "tok".to_string()),
            ("sw_installed_alpha".to_string(), "1".to_string()),
            ("other".to_string(), "x".to_string()),
        ]
    );
}

#[test]
fn get_cookie_searches_all_cookie_headers() {
    let mut headers = HeaderMap::new();
    headers.append(
        axum::http::header::COOKIE,
        "first=1".parse().unwrap(),
    );
    headers.append(
        axum::http::header::COOKIE,
        "sw_alpha=token-value".parse().unwrap(),
    );

    assert_eq!(
        get_cookie(&headers, "sw_alpha"),
        Some("token-value".to_string())
    );
    assert_eq!(get_cookie(&headers, "missing"), None);
}

#[test]
fn cookie_names_embed_the_agent() {
    assert_eq!(session_cookie_name("alpha"), "sw_alpha");
    assert_eq!(sw_installed_cookie_name("alpha"), "sw_installed_alpha");
    assert_eq!(agent_path_prefix("alpha"), "/agents/alpha");
}
