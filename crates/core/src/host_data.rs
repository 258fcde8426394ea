// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Certified host data: the durable `data.json` record for a host.
//!
//! The data file is the source of truth for everything not derivable from
//! the provider API. `idle_timeout_seconds` is stored on disk under the key
//! `max_idle_seconds`.

use crate::activity::ActivityConfig;
use crate::id::HostId;
use crate::name::HostName;
use crate::state::{ActivitySource, HostState, IdleMode, StopReason};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Certified data stored in the host's `data.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertifiedHostData {
    pub id: HostId,
    pub name: HostName,
    pub state: HostState,
    /// Why the host stopped, or `None` when it crashed.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    /// Populated only when the host FAILED.
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Populated only when the host FAILED during a build.
    #[serde(default)]
    pub build_log: Option<String>,
    /// Base image reference, for providers that build or snapshot images.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub idle_mode: IdleMode,
    #[serde(default = "default_max_idle_seconds", rename = "max_idle_seconds")]
    pub idle_timeout_seconds: u64,
    #[serde(default = "ActivitySource::all")]
    pub activity_sources: Vec<ActivitySource>,
    /// Plugin-specific certified data indexed by plugin name.
    #[serde(default)]
    pub plugin: BTreeMap<String, serde_json::Value>,
    /// Work directories generated for agents on this host, tracked so
    /// cleanup can recover them.
    #[serde(default)]
    pub generated_work_dirs: Vec<String>,
    /// Keys this version does not understand. Preserved on rewrite.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

fn default_max_idle_seconds() -> u64 {
    3600
}

impl CertifiedHostData {
    pub fn new(id: HostId, name: HostName) -> Self {
        Self {
            id,
            name,
            state: HostState::Building,
            stop_reason: None,
            failure_reason: None,
            build_log: None,
            image: None,
            idle_mode: IdleMode::default(),
            idle_timeout_seconds: default_max_idle_seconds(),
            activity_sources: ActivitySource::all(),
            plugin: BTreeMap::new(),
            generated_work_dirs: Vec::new(),
            unknown: BTreeMap::new(),
        }
    }

    /// The activity configuration view of this record.
    pub fn activity_config(&self) -> ActivityConfig {
        ActivityConfig {
            idle_mode: self.idle_mode,
            idle_timeout_seconds: self.idle_timeout_seconds,
            activity_sources: self.activity_sources.clone(),
        }
    }

    /// Overwrite the activity configuration fields.
    pub fn set_activity_config(&mut self, config: &ActivityConfig) {
        self.idle_mode = config.idle_mode;
        self.idle_timeout_seconds = config.idle_timeout_seconds;
        self.activity_sources = config.activity_sources.clone();
    }

    /// Log a warning for every key the schema does not know about.
    ///
    /// Unknown keys are skipped, never fatal: the record still loads and the
    /// keys survive the next rewrite.
    pub fn warn_unknown_keys(&self, data_path: &Path) {
        for key in self.unknown.keys() {
            tracing::warn!(
                path = %data_path.display(),
                key,
                "skipping unknown key in host data file"
            );
        }
    }
}

#[cfg(test)]
#[path = "host_data_tests.rs"]
mod tests;
