// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host activity configuration.

use crate::state::{ActivitySource, IdleMode};
use serde::{Deserialize, Serialize};

/// Configuration for host activity detection and idle timeout.
///
/// Mirrored into the host's `data.json` so the in-host activity watcher
/// script can read it without talking back to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Mode for determining when the host is considered idle.
    pub idle_mode: IdleMode,
    /// Maximum idle time before the host is stopped.
    pub idle_timeout_seconds: u64,
    /// Sources whose file mtimes count as activity.
    pub activity_sources: Vec<ActivitySource>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            idle_mode: IdleMode::Agent,
            idle_timeout_seconds: 3600,
            activity_sources: ActivitySource::all(),
        }
    }
}
