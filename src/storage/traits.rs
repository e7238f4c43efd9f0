// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Local cache unavailable or exhausted. Not recoverable.
    #[error("local cache failure: {0}")]
    LocalWriteFatal(String),
    #[error("cloud storage read failed for '{key}': {reason}")]
    RemoteReadFailed { key: String, reason: String },
    #[error("cloud storage write failed for '{key}': {reason}")]
    RemoteWriteFailed { key: String, reason: String },
    #[error("chunk set for '{key}' is missing fragment {index}")]
    IncompleteChunkSet { key: String, index: usize },
}

/// Errors reported by a cloud storage bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("key not found")]
    NotFound,
    #[error("cloud storage not available in this host")]
    Unavailable,
    #[error("value of {len} characters exceeds limit of {limit}")]
    ValueTooLarge { len: usize, limit: usize },
    #[error("bridge error: {0}")]
    Transport(String),
}

/// Synchronous key/value surface backing the local cache.
///
/// Operations are atomic per key and never suspend.
pub trait LocalBackend: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All stored keys (unordered).
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Asynchronous size-bounded key/value store provided by the host platform.
///
/// A missing key is `Ok(None)` from `get_item` and `Ok(false)` from
/// `remove_item`, never an error.
#[async_trait]
pub trait KvBridge: Send + Sync {
    /// Capability probe: is the store reachable in the current host?
    fn is_available(&self) -> bool {
        true
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), BridgeError>;
    async fn get_item(&self, key: &str) -> Result<Option<String>, BridgeError>;

    /// Batch read. Absent keys are omitted from the result.
    async fn get_items(&self, keys: &[String]) -> Result<HashMap<String, String>, BridgeError>;

    /// Returns `false` when the key did not exist.
    async fn remove_item(&self, key: &str) -> Result<bool, BridgeError>;
}
