// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_fixtures::{add_stub_agent, make_fake_host, stub_registry, FakeProvider};
use std::sync::Arc;

#[tokio::test]
async fn grouping_covers_all_hosts_and_agents() {
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    let host1 = make_fake_host(
        dir1.path(),
        "host-one",
        "fake",
        false,
        mng_core::state::HostState::Running,
    )
    .await;
    let host2 = make_fake_host(
        dir2.path(),
        "host-two",
        "fake",
        false,
        mng_core::state::HostState::Running,
    )
    .await;

    add_stub_agent(&host1, "alpha", "RUNNING", &[]).await;
    add_stub_agent(&host1, "beta", "RUNNING", &[]).await;
    add_stub_agent(&host2, "gamma", "RUNNING", &[]).await;

    let mut providers = mng_providers::provider::ProviderRegistry::new();
    providers.register(Arc::new(FakeProvider::new(vec![host1, host2])));
    let ctx = FleetContext::new(providers, stub_registry());

    let grouped = load_all_agents_grouped_by_host(&ctx).await.unwrap();
    assert_eq!(grouped.len(), 2);

    let mut names: Vec<String> = grouped
        .iter()
        .flat_map(|(_, agents)| agents.iter().map(|a| a.agent_name.to_string()))
        .collect();
    names.sort();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn offline_hosts_still_list_their_agents() {
    let dir = tempfile::tempdir().unwrap();
    let host = make_fake_host(
        dir.path(),
        "sleepy",
        "fake",
        false,
        mng_core::state::HostState::Paused,
    )
    .await;
    add_stub_agent(&host, "dreamer", "STOPPED", &[]).await;

    let provider = Arc::new(FakeProvider::new(vec![host.clone()]));
    provider.mark_offline(host.id());
    let mut providers = mng_providers::provider::ProviderRegistry::new();
    providers.register(provider);
    let ctx = FleetContext::new(providers, stub_registry());

    let grouped = load_all_agents_grouped_by_host(&ctx).await.unwrap();
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].1.len(), 1);
    assert_eq!(grouped[0].1[0].agent_name, "dreamer");
    // The reference carries the certified data snapshot for filtering.
    assert_eq!(grouped[0].1[0].certified_data["type"], "stub");
}
