// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Include/exclude filters for fleet operations.
//!
//! A filter term is `<path>=<glob>` or `<path>!=<glob>`, evaluated against a
//! flat JSON context like `{id, name, type, state, host.id, host.provider}`.
//! An agent is selected when it matches every include term (or there are
//! none and `all` was requested) and no exclude term.

use crate::error::MngError;
use glob::Pattern;
use serde_json::Value;

/// One compiled filter term.
#[derive(Debug, Clone)]
struct FilterTerm {
    path: String,
    pattern: Pattern,
    negated: bool,
}

impl FilterTerm {
    fn compile(expr: &str) -> Result<FilterTerm, MngError> {
        let (path, pattern, negated) = if let Some((path, glob)) = expr.split_once("!=") {
            (path, glob, true)
        } else if let Some((path, glob)) = expr.split_once('=') {
            (path, glob, false)
        } else {
            return Err(MngError::InvalidFilter {
                expr: expr.to_string(),
                reason: "expected <path>=<glob> or <path>!=<glob>".to_string(),
            });
        };

        let path = path.trim();
        if path.is_empty() {
            return Err(MngError::InvalidFilter {
                expr: expr.to_string(),
                reason: "empty path".to_string(),
            });
        }

        let pattern = Pattern::new(pattern.trim()).map_err(|e| MngError::InvalidFilter {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;

        Ok(FilterTerm {
            path: path.to_string(),
            pattern,
            negated,
        })
    }

    fn matches(&self, context: &Value) -> bool {
        let value = lookup(context, &self.path);
        let matched = match value {
            Some(Value::String(s)) => self.pattern.matches(s),
            Some(other) => self.pattern.matches(&other.to_string()),
            None => false,
        };
        matched != self.negated
    }
}

/// Dotted-path lookup into a JSON object (`host.provider`).
fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// A compiled set of include and exclude filters.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    include: Vec<FilterTerm>,
    exclude: Vec<FilterTerm>,
}

impl FilterSet {
    /// Compile filter expressions, failing fast on the first invalid term.
    pub fn compile(include: &[String], exclude: &[String]) -> Result<FilterSet, MngError> {
        Ok(FilterSet {
            include: include
                .iter()
                .map(|e| FilterTerm::compile(e))
                .collect::<Result<_, _>>()?,
            exclude: exclude
                .iter()
                .map(|e| FilterTerm::compile(e))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn has_includes(&self) -> bool {
        !self.include.is_empty()
    }

    /// Whether the context passes this filter set.
    ///
    /// With no include terms, everything is included (subject to excludes);
    /// callers gate that case behind an explicit `--all`.
    pub fn selects(&self, context: &Value) -> bool {
        if !self.include.is_empty() && !self.include.iter().all(|t| t.matches(context)) {
            return false;
        }
        !self.exclude.iter().any(|t| t.matches(context))
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
