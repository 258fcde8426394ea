// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable names and the memorable-name generator.
//!
//! Names label hosts and agents for people; ids (see [`crate::id`]) are the
//! stable machine handles. A name is unique within a provider instance, so
//! generation takes an `is_taken` predicate and retries with a short random
//! suffix when the word lists are exhausted.

use rand::prelude::IndexedRandom;
use rand::Rng;

crate::define_string_type! {
    /// Human-readable label for a host, unique within a provider.
    pub struct HostName;
}

crate::define_string_type! {
    /// Human-readable label for an agent, unique within a provider.
    pub struct AgentName;
}

crate::define_string_type! {
    /// Name of one configured provider instance (e.g. `local`, `local_docker`).
    pub struct ProviderInstanceName;
}

crate::define_string_type! {
    /// Agent-chosen label for an HTTP server the agent exposes (e.g. `web`).
    pub struct ServerName;
}

/// The built-in local provider instance name.
pub const LOCAL_PROVIDER_NAME: &str = "local";

const ADJECTIVES: &[&str] = &[
    "amber", "ancient", "bold", "brave", "bright", "calm", "clever", "copper", "coral", "cosmic",
    "crimson", "curious", "daring", "dusty", "eager", "early", "fearless", "fierce", "floral",
    "gentle", "gilded", "golden", "hidden", "humble", "ivory", "jolly", "keen", "lively", "lucky",
    "lunar", "mellow", "mighty", "misty", "noble", "nimble", "opal", "patient", "plucky", "proud",
    "quiet", "rapid", "rustic", "silent", "silver", "solar", "steady", "stormy", "swift", "tidal",
    "velvet", "vivid", "wandering", "wild", "witty",
];

const NOUNS: &[&str] = &[
    "anchor", "aspen", "badger", "beacon", "bison", "brook", "canyon", "cedar", "comet", "condor",
    "cricket", "dahlia", "delta", "ember", "falcon", "fern", "finch", "fjord", "gecko", "glacier",
    "harbor", "heron", "ibis", "iris", "jackal", "juniper", "kestrel", "lagoon", "lantern",
    "lemur", "linnet", "lynx", "maple", "marmot", "meadow", "mesa", "nettle", "newt", "orchid",
    "osprey", "otter", "pebble", "pine", "plover", "quartz", "raven", "reef", "sable", "sparrow",
    "summit", "thistle", "tundra", "walnut", "wren",
];

/// How many adjective-noun draws to attempt before falling back to a
/// random-suffix name.
const MAX_NAME_ATTEMPTS: usize = 16;

fn generate_memorable_name(is_taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::rng();
    for _ in 0..MAX_NAME_ATTEMPTS {
        // Word lists are non-empty constants, so choose() cannot fail.
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("swift");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("falcon");
        let candidate = format!("{}-{}", adjective, noun);
        if !is_taken(&candidate) {
            return candidate;
        }
    }

    // Dense namespace: disambiguate with a short hex suffix.
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("swift");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("falcon");
    let suffix: String = (0..4)
        .map(|_| format!("{:x}", rng.random::<u8>() % 16))
        .collect();
    format!("{}-{}-{}", adjective, noun, suffix)
}

/// Generate a memorable host name not rejected by `is_taken`.
pub fn generate_host_name(is_taken: impl Fn(&str) -> bool) -> HostName {
    HostName::new(generate_memorable_name(is_taken))
}

/// Generate a memorable agent name not rejected by `is_taken`.
pub fn generate_agent_name(is_taken: impl Fn(&str) -> bool) -> AgentName {
    AgentName::new(generate_memorable_name(is_taken))
}

#[cfg(test)]
#[path = "name_tests.rs"]
mod tests;
