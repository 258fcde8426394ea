// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    host_not_found = { MngError::HostNotFound("x".into()), ErrorFamily::User, 2 },
    offline = { MngError::HostOffline("x".into()), ErrorFamily::Operational, 1 },
    timeout = { MngError::CommandTimeout { timeout_seconds: 10.0 }, ErrorFamily::Operational, 1 },
    schema = {
        MngError::HostDataSchema { path: "/d/data.json".into(), detail: "bad".into() },
        ErrorFamily::Schema,
        1
    },
)]
fn families_and_exit_codes(error: MngError, family: ErrorFamily, exit_code: i32) {
    assert_eq!(error.family(), family);
    assert_eq!(error.exit_code(), exit_code);
}

#[test]
fn schema_errors_carry_a_remediation_hint() {
    let error = MngError::HostDataSchema {
        path: "/hosts/h1/data.json".into(),
        detail: "missing field `id`".into(),
    };
    let help = error.user_help_text().unwrap();
    assert!(help.contains("/hosts/h1/data.json"));
    assert!(help.contains("Delete"));
}

#[test]
fn not_found_errors_point_at_list() {
    let help = MngError::AgentNotFound("alpha".into())
        .user_help_text()
        .unwrap();
    assert!(help.contains("mng list"));
}
