// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed auth store for the forwarding server.
//!
//! One-time codes and session tokens live in two JSON files under an
//! `auth/` directory. Every mutation takes the store lock and writes
//! atomically (temp file + rename), so concurrent readers always see a
//! complete file.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How long an issued session token stays valid.
const SESSION_TOKEN_TTL_DAYS: i64 = 30;

const CODES_FILENAME: &str = "one_time_codes.json";
const TOKENS_FILENAME: &str = "session_tokens.json";

#[derive(Debug, Error)]
pub enum AuthStoreError {
    #[error("auth store IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("auth store file is corrupt: {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SessionToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CodesFile {
    /// Unconsumed one-time codes per agent name.
    #[serde(default)]
    codes: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokensFile {
    /// Issued session tokens per agent name.
    #[serde(default)]
    tokens: BTreeMap<String, Vec<SessionToken>>,
}

/// One-time codes and session tokens, persisted under a data directory.
pub struct FileAuthStore {
    data_directory: PathBuf,
    lock: Mutex<()>,
}

impl FileAuthStore {
    pub fn new(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
            lock: Mutex::new(()),
        }
    }

    fn codes_path(&self) -> PathBuf {
        self.data_directory.join(CODES_FILENAME)
    }

    fn tokens_path(&self) -> PathBuf {
        self.data_directory.join(TOKENS_FILENAME)
    }

    fn load<T: Default + serde::de::DeserializeOwned>(path: &Path) -> Result<T, AuthStoreError> {
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| AuthStoreError::Corrupt {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(AuthStoreError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), AuthStoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AuthStoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let serialized =
            serde_json::to_string_pretty(value).map_err(|e| AuthStoreError::Corrupt {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, serialized).map_err(|e| AuthStoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, path).map_err(|e| AuthStoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Register a one-time code for an agent. Idempotent.
    pub fn add_one_time_code(&self, agent_name: &str, code: &str) -> Result<(), AuthStoreError> {
        let _guard = self.lock.lock();
        let mut file: CodesFile = Self::load(&self.codes_path())?;
        file.codes
            .entry(agent_name.to_string())
            .or_default()
            .insert(code.to_string());
        Self::save(&self.codes_path(), &file)
    }

    /// Atomically consume a code. The first consume returns true; every
    /// further consume of the same code returns false.
    pub fn consume_one_time_code(
        &self,
        agent_name: &str,
        code: &str,
    ) -> Result<bool, AuthStoreError> {
        let _guard = self.lock.lock();
        let mut file: CodesFile = Self::load(&self.codes_path())?;
        let removed = file
            .codes
            .get_mut(agent_name)
            .map(|codes| codes.remove(code))
            .unwrap_or(false);
        if removed {
            Self::save(&self.codes_path(), &file)?;
        }
        Ok(removed)
    }

    /// Issue a fresh session token for an agent.
    pub fn issue_session_token(
        &self,
        agent_name: &str,
    ) -> Result<(String, DateTime<Utc>), AuthStoreError> {
        let _guard = self.lock.lock();
        let token = uuid::Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + Duration::days(SESSION_TOKEN_TTL_DAYS);

        let mut file: TokensFile = Self::load(&self.tokens_path())?;
        let tokens = file.tokens.entry(agent_name.to_string()).or_default();
        // Expired tokens are dropped whenever the file is rewritten.
        tokens.retain(|t| t.expires_at > Utc::now());
        tokens.push(SessionToken {
            token: token.clone(),
            expires_at,
        });
        Self::save(&self.tokens_path(), &file)?;

        Ok((token, expires_at))
    }

    /// Whether a presented token is valid (and unexpired) for an agent.
    pub fn is_session_valid(&self, agent_name: &str, token: &str) -> bool {
        let _guard = self.lock.lock();
        let file: TokensFile = match Self::load(&self.tokens_path()) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load session tokens");
                return false;
            }
        };
        file.tokens
            .get(agent_name)
            .map(|tokens| {
                tokens
                    .iter()
                    .any(|t| t.token == token && t.expires_at > Utc::now())
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
