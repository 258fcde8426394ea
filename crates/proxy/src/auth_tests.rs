// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn store() -> (tempfile::TempDir, FileAuthStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileAuthStore::new(dir.path().join("auth"));
    (dir, store)
}

#[test]
fn code_consumes_exactly_once() {
    let (_dir, store) = store();
    store.add_one_time_code("alpha", "code-1").unwrap();

    assert!(store.consume_one_time_code("alpha", "code-1").unwrap());
    assert!(!store.consume_one_time_code("alpha", "code-1").unwrap());
}

#[test]
fn add_is_idempotent() {
    let (_dir, store) = store();
    store.add_one_time_code("alpha", "code-1").unwrap();
    store.add_one_time_code("alpha", "code-1").unwrap();

    assert!(store.consume_one_time_code("alpha", "code-1").unwrap());
    // A double add must not leave a second consumable copy behind.
    assert!(!store.consume_one_time_code("alpha", "code-1").unwrap());
}

#[test]
fn codes_are_scoped_per_agent() {
    let (_dir, store) = store();
    store.add_one_time_code("alpha", "shared-code").unwrap();

    assert!(!store.consume_one_time_code("beta", "shared-code").unwrap());
    assert!(store.consume_one_time_code("alpha", "shared-code").unwrap());
}

#[test]
fn issued_tokens_validate_until_expiry() {
    let (_dir, store) = store();
    let (token, expires_at) = store.issue_session_token("alpha").unwrap();

    assert!(expires_at > Utc::now());
    assert!(store.is_session_valid("alpha", &token));
    assert!(!store.is_session_valid("beta", &token));
    assert!(!store.is_session_valid("alpha", "forged-token"));
}

#[test]
fn state_survives_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let auth_dir = dir.path().join("auth");

    let (token, _) = {
        let store = FileAuthStore::new(&auth_dir);
        store.add_one_time_code("alpha", "persisted-code").unwrap();
        store.issue_session_token("alpha").unwrap()
    };

    let reopened = FileAuthStore::new(&auth_dir);
    assert!(reopened.is_session_valid("alpha", &token));
    assert!(reopened
        .consume_one_time_code("alpha", "persisted-code")
        .unwrap());
}

#[test]
fn writes_are_atomic_no_temp_left_behind() {
    let (dir, store) = store();
    store.add_one_time_code("alpha", "code").unwrap();
    let _ = dir;

    let auth_dir = store.codes_path().parent().unwrap().to_path_buf();
    let leftovers: Vec<_> = std::fs::read_dir(auth_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn expired_tokens_are_rejected() {
    let (_dir, store) = store();
    let (token, _) = store.issue_session_token("alpha").unwrap();

    // Rewrite the token file with an expiry in the past.
    let path = store.tokens_path();
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    value["tokens"]["alpha"][0]["expires_at"] = serde_json::json!("2001-01-01T00:00:00Z");
    std::fs::write(&path, value.to_string()).unwrap();

    assert!(!store.is_session_valid("alpha", &token));
}
