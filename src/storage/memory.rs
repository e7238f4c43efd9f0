// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use dashmap::DashMap;
use crate::chunking::char_len;
use super::traits::{BridgeError, KvBridge, LocalBackend, StorageError};

/// In-memory local cache backend.
pub struct MemoryLocalStore {
    data: DashMap<String, String>,
}

impl MemoryLocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend for MemoryLocalStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.data.iter().map(|r| r.key().clone()).collect())
    }
}

/// In-process cloud storage bridge.
///
/// Enforces the same per-value ceiling as the platform store, so chunking
/// behaves as it would against the real host. Availability can be toggled to
/// simulate running outside the chat client.
pub struct MemoryBridge {
    data: DashMap<String, String>,
    value_limit: usize,
    available: AtomicBool,
}

impl MemoryBridge {
    #[must_use]
    pub fn new(value_limit: usize) -> Self {
        Self {
            data: DashMap::new(),
            value_limit,
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Raw entry, bypassing availability (for inspection).
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|r| r.value().clone())
    }

    /// Drop an entry without going through the bridge API.
    pub fn evict(&self, key: &str) {
        self.data.remove(key);
    }

    /// Sorted snapshot of stored keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    fn check_available(&self) -> Result<(), BridgeError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::Unavailable)
        }
    }
}

#[async_trait]
impl KvBridge for MemoryBridge {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        self.check_available()?;
        let len = char_len(value);
        if len > self.value_limit {
            return Err(BridgeError::ValueTooLarge { len, limit: self.value_limit });
        }
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>, BridgeError> {
        self.check_available()?;
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn get_items(&self, keys: &[String]) -> Result<HashMap<String, String>, BridgeError> {
        self.check_available()?;
        Ok(keys
            .iter()
            .filter_map(|k| self.data.get(k).map(|v| (k.clone(), v.value().clone())))
            .collect())
    }

    async fn remove_item(&self, key: &str) -> Result<bool, BridgeError> {
        self.check_available()?;
        Ok(self.data.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_empty() {
        let store = MemoryLocalStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_put_and_get() {
        let store = MemoryLocalStore::new();
        store.set_raw("finance_accounts", "[]").unwrap();
        assert_eq!(store.get_raw("finance_accounts").unwrap().as_deref(), Some("[]"));
        assert!(store.get_raw("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let store = MemoryLocalStore::new();
        store.set_raw("k", "1").unwrap();
        store.set_raw("k", "2").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_raw("k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_delete_nonexistent_is_ok() {
        let store = MemoryLocalStore::new();
        assert!(store.remove("nonexistent").is_ok());
    }

    #[tokio::test]
    async fn test_bridge_enforces_value_limit() {
        let bridge = MemoryBridge::new(5);
        bridge.set_item("k", "12345").await.unwrap();
        let err = bridge.set_item("k", "123456").await.unwrap_err();
        assert_eq!(err, BridgeError::ValueTooLarge { len: 6, limit: 5 });
        assert_eq!(bridge.peek("k").as_deref(), Some("12345"));
    }

    #[tokio::test]
    async fn test_bridge_remove_reports_missing() {
        let bridge = MemoryBridge::new(10);
        bridge.set_item("k", "v").await.unwrap();
        assert!(bridge.remove_item("k").await.unwrap());
        assert!(!bridge.remove_item("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_bridge_get_items_omits_missing() {
        let bridge = MemoryBridge::new(10);
        bridge.set_item("a", "1").await.unwrap();
        bridge.set_item("c", "3").await.unwrap();
        let found = bridge
            .get_items(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["c"], "3");
    }

    #[tokio::test]
    async fn test_bridge_unavailable() {
        let bridge = MemoryBridge::new(10);
        bridge.set_available(false);
        assert!(!bridge.is_available());
        assert_eq!(bridge.get_item("k").await.unwrap_err(), BridgeError::Unavailable);
    }

    #[tokio::test]
    async fn test_concurrent_bridge_writes() {
        use std::sync::Arc;

        let bridge = Arc::new(MemoryBridge::new(100));
        let mut handles = vec![];
        for batch in 0..10 {
            let bridge = bridge.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    bridge.set_item(&format!("b{}_{}", batch, i), "v").await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(bridge.len(), 100);
    }
}
