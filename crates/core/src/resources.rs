// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider-managed snapshot and volume records.

use crate::id::{HostId, SnapshotId, VolumeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Information about a snapshot of a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Size in bytes, where the provider reports one.
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// Recency within the host: 0 is the most recent snapshot.
    #[serde(default)]
    pub recency_idx: u32,
}

/// Information about a persistent volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub volume_id: VolumeId,
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Host this volume is attached to, if any.
    #[serde(default)]
    pub host_id: Option<HostId>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}
