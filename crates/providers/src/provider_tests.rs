// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::local::LocalProvider;
use mng_core::config::MngConfig;

#[tokio::test]
async fn registry_resolves_by_instance_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(LocalProvider::new(MngConfig::new(dir.path()))));

    let provider = registry.get("local").unwrap();
    assert_eq!(provider.name().as_str(), "local");
    assert_eq!(registry.all().len(), 1);
}

#[tokio::test]
async fn registry_rejects_unknown_provider() {
    let registry = ProviderRegistry::new();
    let result = registry.get("modal-prod");
    assert!(matches!(result, Err(MngError::ProviderNotFound(_))));
}

#[tokio::test]
async fn offline_handles_refuse_online_access() {
    let data = mng_core::host_data::CertifiedHostData::new(
        HostId::generate(),
        HostName::new("gone"),
    );
    let handle = HostHandle::Offline(crate::offline_host::OfflineHost::new(
        ProviderInstanceName::new("local"),
        data,
        vec![],
    ));

    assert!(!handle.is_online());
    assert!(matches!(handle.online(), Err(MngError::HostOffline(_))));
}

#[tokio::test]
async fn rename_host_is_forbidden_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let provider = LocalProvider::new(MngConfig::new(dir.path()));
    let host = provider
        .create_host(mng_core::options::NewHostOptions::default())
        .await
        .unwrap();

    let result = provider
        .rename_host(host.id(), &HostName::new("other"))
        .await;
    assert!(matches!(result, Err(MngError::OperationNotSupported(_))));
}
