// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent environment files.
//!
//! An agent's environment is merged from three sources, later overriding
//! earlier: variables forwarded from the invoking shell, literal `KEY=VALUE`
//! pairs, and env files. The merged set is written to `<agent_dir>/env` as
//! `KEY=VALUE` lines; re-provisioning preserves keys already present and
//! overwrites only on collision.

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped, as are
/// lines without an `=`.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            vars.push((key.to_string(), value.to_string()));
        }
    }
    vars
}

/// Render variables as `KEY=VALUE` lines with a trailing newline.
pub fn render_env_file(vars: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in vars {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Insert or overwrite a key while keeping first-seen ordering.
fn upsert(vars: &mut Vec<(String, String)>, key: String, value: String) {
    match vars.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => vars.push((key, value)),
    }
}

/// Merge the three environment sources in override order.
///
/// `lookup` resolves `pass_env` names from the invoking shell; names that
/// resolve to nothing are silently skipped.
pub fn merge_env_sources(
    pass_env: &[String],
    literals: &[(String, String)],
    env_file_contents: &[String],
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();

    for name in pass_env {
        if let Some(value) = lookup(name) {
            upsert(&mut merged, name.clone(), value);
        }
    }
    for (key, value) in literals {
        upsert(&mut merged, key.clone(), value.clone());
    }
    for content in env_file_contents {
        for (key, value) in parse_env_file(content) {
            upsert(&mut merged, key, value);
        }
    }

    merged
}

/// Merge a freshly computed set into an existing env file's contents.
///
/// Keys already on disk survive unless the new set collides with them.
pub fn merge_preserving_existing(existing: &str, new_vars: &[(String, String)]) -> String {
    let mut merged = parse_env_file(existing);
    for (key, value) in new_vars {
        upsert(&mut merged, key.clone(), value.clone());
    }
    render_env_file(&merged)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
