// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque identifiers for hosts, agents, snapshots, and volumes.
//!
//! Ids are globally unique strings of the form `<kind>-<32 hex>`, generated
//! from uniformly-random UUIDs stringified without dashes. An id is assigned
//! once and never reused; names (see [`crate::name`]) are the human-facing
//! labels and are only unique within a provider.

crate::define_prefixed_id! {
    /// Unique identifier for an execution environment (host).
    pub struct HostId, "host";
}

crate::define_prefixed_id! {
    /// Unique identifier for an agent instance.
    ///
    /// Distinct from the terminal session name, which is derived from the
    /// agent's *name* and may be adopted by a newer agent of the same name.
    pub struct AgentId, "agent";
}

crate::define_prefixed_id! {
    /// Unique identifier for a provider-managed host snapshot.
    pub struct SnapshotId, "snapshot";
}

crate::define_prefixed_id! {
    /// Unique identifier for a provider-managed persistent volume.
    pub struct VolumeId, "volume";
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
