// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the sync coordinator.
//!
//! # Example
//!
//! ```
//! use finance_sync::SyncConfig;
//!
//! // Minimal config (local cache + cloud storage only)
//! let config = SyncConfig::default();
//! assert_eq!(config.key_prefix, "finance_");
//! assert_eq!(config.remote_value_limit, 4000);
//! assert!(!config.has_backend());
//!
//! // With a backend API
//! let config = SyncConfig {
//!     api_url: Some("https://project.example.co".into()),
//!     api_key: Some("anon-key".into()),
//!     ..Default::default()
//! };
//! assert!(config.has_backend());
//! ```

use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("remote_value_limit must be greater than zero")]
    ZeroValueLimit,
    #[error("key_prefix must not be empty")]
    EmptyPrefix,
    #[error("invalid api_url '{0}'")]
    InvalidApiUrl(String),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("failed to open local cache: {0}")]
    LocalStore(String),
}

/// Configuration for the sync coordinator.
///
/// All fields have defaults. Set `api_url` and `api_key` to enable the
/// backend API tier.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Namespace prepended to every collection name in local and cloud storage
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Max characters per value in the cloud store (platform limit is 4096)
    #[serde(default = "default_remote_value_limit")]
    pub remote_value_limit: usize,

    /// Upper bound on stale fragment removals probed after a shrink
    #[serde(default = "default_remote_cleanup_probe_limit")]
    pub remote_cleanup_probe_limit: usize,

    /// Backend service base URL (e.g. "https://project.example.co")
    #[serde(default)]
    pub api_url: Option<String>,

    /// Bearer credential sent with every backend request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path of the sync endpoint, joined to `api_url`
    #[serde(default = "default_sync_path")]
    pub sync_path: String,

    /// Header carrying the host's signed identity token
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Backend request deadline
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Delay before a scheduled push reads the queue, so bursts coalesce
    #[serde(default = "default_push_debounce_ms")]
    pub push_debounce_ms: u64,

    /// Fixed interval between failed push passes
    #[serde(default = "default_push_retry_ms")]
    pub push_retry_ms: u64,

    /// Give up a push cycle after this many attempts (None = keep retrying
    /// while writes are queued)
    #[serde(default)]
    pub max_push_retries: Option<usize>,

    /// Directory for the file-backed local cache (None = in-memory)
    #[serde(default)]
    pub local_path: Option<String>,
}

fn default_key_prefix() -> String { "finance_".to_string() }
fn default_remote_value_limit() -> usize { 4000 }
fn default_remote_cleanup_probe_limit() -> usize { 1024 } // platform key quota
fn default_sync_path() -> String { "/functions/v1/sync".to_string() }
fn default_identity_header() -> String { "x-telegram-init-data".to_string() }
fn default_api_timeout_ms() -> u64 { 10_000 }
fn default_push_debounce_ms() -> u64 { 100 }
fn default_push_retry_ms() -> u64 { 2_000 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            remote_value_limit: default_remote_value_limit(),
            remote_cleanup_probe_limit: default_remote_cleanup_probe_limit(),
            api_url: None,
            api_key: None,
            sync_path: default_sync_path(),
            identity_header: default_identity_header(),
            api_timeout_ms: default_api_timeout_ms(),
            push_debounce_ms: default_push_debounce_ms(),
            push_retry_ms: default_push_retry_ms(),
            max_push_retries: None,
            local_path: None,
        }
    }
}

impl SyncConfig {
    /// Both an endpoint and a credential are configured.
    #[must_use]
    pub fn has_backend(&self) -> bool {
        matches!((&self.api_url, &self.api_key), (Some(url), Some(key)) if !url.is_empty() && !key.is_empty())
    }

    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    #[must_use]
    pub fn push_debounce(&self) -> Duration {
        Duration::from_millis(self.push_debounce_ms)
    }

    #[must_use]
    pub fn push_retry_interval(&self) -> Duration {
        Duration::from_millis(self.push_retry_ms)
    }

    /// Reject values the storage layer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_value_limit == 0 {
            return Err(ConfigError::ZeroValueLimit);
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if let Some(ref url) = self.api_url {
            if !url.is_empty() && reqwest::Url::parse(url).is_err() {
                return Err(ConfigError::InvalidApiUrl(url.clone()));
            }
        }
        Ok(())
    }

    /// Test config: short debounce and retry interval.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            push_debounce_ms: 10,
            push_retry_ms: 20,
            api_timeout_ms: 500,
            ..Default::default()
        }
    }
}
