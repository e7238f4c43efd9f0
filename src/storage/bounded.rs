// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Chunked adapter over the size-bounded cloud store.
//!
//! A value is stored in exactly one of two layouts:
//!
//! ```text
//! direct:   finance_transactions          → "<json>"
//! chunked:  finance_transactions_chunks   → "3"
//!           finance_transactions_0        → "<first 4000 chars>"
//!           finance_transactions_1        → "<next 4000 chars>"
//!           finance_transactions_2        → "<rest>"
//! ```
//!
//! Writing one layout removes leftovers of the other, otherwise a stale
//! metadata entry or direct entry would resurrect superseded data on the
//! next read.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chunking::{self, char_len};
use super::traits::{BridgeError, KvBridge, StorageError};

/// Suffix of the chunk-count metadata entry.
pub const CHUNK_META_SUFFIX: &str = "_chunks";

pub struct BoundedStore {
    bridge: Arc<dyn KvBridge>,
    value_limit: usize,
    cleanup_probe_limit: usize,
}

impl BoundedStore {
    pub fn new(bridge: Arc<dyn KvBridge>, value_limit: usize) -> Self {
        Self {
            bridge,
            value_limit: value_limit.max(1),
            cleanup_probe_limit: 1024,
        }
    }

    /// Most fragments one value may occupy. Bounds chunked writes, the
    /// chunk count trusted on read and fragment removals after a shrink.
    #[must_use]
    pub fn with_cleanup_probe_limit(mut self, limit: usize) -> Self {
        self.cleanup_probe_limit = limit;
        self
    }

    pub fn value_limit(&self) -> usize {
        self.value_limit
    }

    pub fn is_available(&self) -> bool {
        self.bridge.is_available()
    }

    #[inline]
    fn meta_key(key: &str) -> String {
        format!("{}{}", key, CHUNK_META_SUFFIX)
    }

    #[inline]
    fn fragment_key(key: &str, index: usize) -> String {
        format!("{}_{}", key, index)
    }

    /// Store `serialized` under `key`, chunking when it exceeds the limit.
    pub async fn put(&self, key: &str, serialized: &str) -> Result<(), StorageError> {
        let write_err = |e: BridgeError| StorageError::RemoteWriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        if char_len(serialized) <= self.value_limit {
            self.bridge.set_item(key, serialized).await.map_err(write_err)?;
            self.best_effort_remove(&Self::meta_key(key)).await;
            self.remove_fragments(key).await;
            debug!(key = %key, "Cloud storage direct write");
            return Ok(());
        }

        let fragments = chunking::split(serialized, self.value_limit);
        if fragments.len() > self.cleanup_probe_limit {
            return Err(StorageError::RemoteWriteFailed {
                key: key.to_string(),
                reason: format!(
                    "{} fragments exceed the key quota of {}",
                    fragments.len(),
                    self.cleanup_probe_limit
                ),
            });
        }
        self.bridge
            .set_item(&Self::meta_key(key), &fragments.len().to_string())
            .await
            .map_err(write_err)?;
        for (index, fragment) in fragments.iter().enumerate() {
            self.bridge
                .set_item(&Self::fragment_key(key, index), fragment)
                .await
                .map_err(write_err)?;
        }
        self.best_effort_remove(key).await;
        debug!(key = %key, chunks = fragments.len(), "Cloud storage chunked write");
        Ok(())
    }

    /// Read the value stored under `key` in either layout.
    pub async fn fetch(&self, key: &str) -> Result<Option<String>, StorageError> {
        let read_err = |e: BridgeError| StorageError::RemoteReadFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let meta = self.bridge.get_item(&Self::meta_key(key)).await.map_err(read_err)?;
        if let Some(count) = meta.as_deref().and_then(parse_chunk_count) {
            if count == 0 {
                return Ok(None);
            }
            if count > self.cleanup_probe_limit {
                warn!(key = %key, count, max = self.cleanup_probe_limit, "Chunk count exceeds key quota");
                return Err(StorageError::IncompleteChunkSet {
                    key: key.to_string(),
                    index: self.cleanup_probe_limit,
                });
            }
            let fragment_keys: Vec<String> = (0..count).map(|i| Self::fragment_key(key, i)).collect();
            let mut found = self.bridge.get_items(&fragment_keys).await.map_err(read_err)?;
            let fragments: HashMap<usize, String> = fragment_keys
                .iter()
                .enumerate()
                .filter_map(|(i, k)| found.remove(k).filter(|v| !v.is_empty()).map(|v| (i, v)))
                .collect();
            let joined = chunking::join(&fragments, count).map_err(|e| StorageError::IncompleteChunkSet {
                key: key.to_string(),
                index: e.index,
            })?;
            debug!(key = %key, chunks = count, "Cloud storage chunked read");
            return Ok(Some(joined));
        }

        let direct = self.bridge.get_item(key).await.map_err(read_err)?;
        Ok(direct.filter(|v| !v.is_empty()))
    }

    /// Remove both layouts for `key`.
    pub async fn remove(&self, key: &str) {
        self.best_effort_remove(key).await;
        self.best_effort_remove(&Self::meta_key(key)).await;
        self.remove_fragments(key).await;
    }

    /// Remove `key_0, key_1, …` until one is reported missing.
    async fn remove_fragments(&self, key: &str) {
        for index in 0..self.cleanup_probe_limit {
            match self.bridge.remove_item(&Self::fragment_key(key, index)).await {
                Ok(true) => continue,
                Ok(false) | Err(BridgeError::NotFound) => break,
                Err(e) => {
                    debug!(key = %key, index, error = %e, "Fragment cleanup stopped");
                    break;
                }
            }
        }
    }

    async fn best_effort_remove(&self, key: &str) {
        match self.bridge.remove_item(key).await {
            Ok(_) | Err(BridgeError::NotFound) => {}
            Err(e) => warn!(key = %key, error = %e, "Cloud storage cleanup failed"),
        }
    }
}

/// A metadata value is a plain decimal count.
fn parse_chunk_count(meta: &str) -> Option<usize> {
    if meta.is_empty() || !meta.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    meta.parse().ok()
}
