// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn round_trips_with_iso8601_create_time() {
    let data = CertifiedAgentData::new(
        AgentId::generate(),
        AgentName::new("alpha"),
        "tui",
        "claude",
        "/work/alpha",
        HostId::generate(),
    );

    let json = serde_json::to_string(&data).unwrap();
    let back: CertifiedAgentData = serde_json::from_str(&json).unwrap();
    assert_eq!(back, data);

    // create_time must serialize as an ISO8601 UTC string
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let time = value["create_time"].as_str().unwrap();
    assert!(time.ends_with('Z') || time.contains("+00:00"), "{}", time);
}

#[test]
fn agent_type_serializes_under_type_key() {
    let data = CertifiedAgentData::new(
        AgentId::generate(),
        AgentName::new("alpha"),
        "process",
        "sleep 99999",
        "/work/alpha",
        HostId::generate(),
    );
    let value = serde_json::to_value(&data).unwrap();
    assert_eq!(value["type"], "process");
}

#[test]
fn extra_keys_survive_a_rewrite() {
    let json = serde_json::json!({
        "id": "agent-0123456789abcdef0123456789abcdef",
        "name": "alpha",
        "type": "tui",
        "command": "claude",
        "work_dir": "/work/alpha",
        "host_id": "host-0123456789abcdef0123456789abcdef",
        "create_time": "2026-01-02T03:04:05Z",
        "custom_plugin_field": 7,
    });

    let data: CertifiedAgentData = serde_json::from_value(json).unwrap();
    let rewritten = serde_json::to_value(&data).unwrap();
    assert_eq!(rewritten["custom_plugin_field"], 7);
}
