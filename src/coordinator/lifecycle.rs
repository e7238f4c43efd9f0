// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Whole-set operations: startup load, background refresh, batch save and
//! shutdown.

use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use crate::collection::{sanitize_all, Collection, CollectionMap};
use crate::metrics::{self, TIER_BACKEND};
use crate::storage::{LocalCache, StorageError};

use super::{SyncCoordinator, SyncEvent};

impl SyncCoordinator {
    /// Load every collection from the local cache for first paint.
    ///
    /// Missing or malformed collections are replaced with built-in defaults,
    /// which are persisted locally but not queued for the backend. A detached
    /// refresh then reconciles with the backend (or restores from cloud
    /// storage) and publishes [`SyncEvent::Refreshed`] when done.
    #[tracing::instrument(skip(self))]
    pub fn load_all(&self) -> Result<CollectionMap, StorageError> {
        let stored = self.read_local_set()?;
        let absent: Vec<Collection> = Collection::ALL
            .into_iter()
            .filter(|c| !stored.contains_key(c))
            .collect();

        let (set, replaced) = sanitize_all(stored);
        for collection in &replaced {
            self.inner.local.set(collection.as_str(), &set[collection])?;
        }
        info!(absent = absent.len(), replaced = replaced.len(), "Local collections loaded");

        let this = self.clone();
        if let Some(handle) = self.spawn_detached("refresh", async move { this.refresh(absent).await }) {
            if let Some(previous) = self.inner.refresh_task.lock().replace(handle) {
                previous.abort();
            }
        }
        Ok(set)
    }

    /// Local values for every collection that has one.
    fn read_local_set(&self) -> Result<CollectionMap, StorageError> {
        let names: Vec<&str> = Collection::ALL.iter().map(|c| c.as_str()).collect();
        let mut stored = self.inner.local.get_all_sync(&names)?;
        Ok(Collection::ALL
            .into_iter()
            .filter_map(|c| stored.remove(c.as_str()).flatten().map(|v| (c, v)))
            .collect())
    }

    async fn refresh(self, absent_locally: Vec<Collection>) {
        if self.available_backend().is_some() {
            match self.refresh_from_backend().await {
                Ok(set) => {
                    self.emit(SyncEvent::Refreshed(set));
                    return;
                }
                Err(e) => warn!(error = %e, "Backend refresh failed, trying cloud storage"),
            }
        }

        match self.restore_from_remote(&absent_locally).await {
            Ok(Some(set)) => self.emit(SyncEvent::Refreshed(set)),
            Ok(None) => debug!("Nothing to restore from cloud storage"),
            Err(e) => warn!(error = %e, "Cloud storage restore failed"),
        }
    }

    /// Pull the server set over the local cache, re-validate, push the
    /// reconciled set back and mirror every collection.
    async fn refresh_from_backend(&self) -> Result<CollectionMap, RefreshError> {
        let backend = self.available_backend().ok_or(RefreshError::Unavailable)?;
        let timeout = self.inner.config.api_timeout();

        let server = tokio::time::timeout(timeout, backend.pull())
            .await
            .map_err(|_| RefreshError::Timeout)?
            .map_err(|e| RefreshError::Backend(e.to_string()))?;
        metrics::record_operation(TIER_BACKEND, "pull", "success");

        // Queued collections are newer locally than anything the server holds
        let dirty = self.pending();
        for (collection, value) in &server {
            if dirty.contains(collection) {
                debug!(collection = %collection, "Keeping unpushed local value");
                continue;
            }
            self.inner.local.set(collection.as_str(), value)?;
        }

        let (set, replaced) = sanitize_all(self.read_local_set()?);
        for collection in &replaced {
            self.inner.local.set(collection.as_str(), &set[collection])?;
        }

        match tokio::time::timeout(timeout, backend.push(&set)).await {
            Ok(Ok(())) => metrics::record_push(set.len(), true),
            Ok(Err(e)) => {
                metrics::record_push(set.len(), false);
                warn!(error = %e, "Push of reconciled set failed");
            }
            Err(_) => {
                metrics::record_push(set.len(), false);
                warn!("Push of reconciled set timed out");
            }
        }

        for collection in Collection::ALL {
            self.spawn_mirror(collection.as_str().to_string());
        }

        info!(from_server = server.len(), "Collections refreshed from backend");
        Ok(set)
    }

    /// Fill collections that were absent locally from cloud storage.
    ///
    /// Returns the full set when anything was restored.
    async fn restore_from_remote(&self, absent: &[Collection]) -> Result<Option<CollectionMap>, StorageError> {
        if absent.is_empty() || self.available_remote().is_none() {
            return Ok(None);
        }

        let mut restored = 0usize;
        for collection in absent {
            let key = collection.as_str();
            let text = match self.fetch_remote(key).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(StorageError::IncompleteChunkSet { key, index }) => {
                    warn!(key = %key, index, "Incomplete chunk set, keeping default");
                    self.emit(SyncEvent::ChunkSetIncomplete { key, index });
                    continue;
                }
                Err(e) => return Err(e),
            };

            // A write since load_all replaced the default; it wins
            if self.inner.local.get(key)? != Some(collection.default_value()) {
                debug!(collection = %collection, "Local value changed since load, skipping restore");
                continue;
            }

            let (value, _) = collection.sanitize(Some(LocalCache::decode(&text)));
            self.inner.local.set(key, &value)?;
            restored += 1;
        }

        if restored == 0 {
            return Ok(None);
        }
        info!(restored, "Collections restored from cloud storage");
        let (set, _) = sanitize_all(self.read_local_set()?);
        Ok(Some(set))
    }

    /// Write a batch of collections.
    ///
    /// Local writes happen first. With a backend, the batch is pushed in one
    /// request; on failure every collection is queued for background retry
    /// and mirrored in the background. Without a backend, each collection is
    /// mirrored before returning, bounded by the API timeout. Remote failures
    /// are logged, never returned.
    #[tracing::instrument(skip(self, data), fields(collections = data.len()))]
    pub async fn save_all(&self, data: &CollectionMap) -> Result<(), StorageError> {
        for (collection, value) in data {
            self.inner.local.set(collection.as_str(), value)?;
        }
        if data.is_empty() {
            return Ok(());
        }

        if let Some(backend) = self.available_backend() {
            let seq_at_write = self.inner.write_seq.load(Ordering::SeqCst);
            match tokio::time::timeout(self.inner.config.api_timeout(), backend.push(data)).await {
                Ok(Ok(())) => {
                    metrics::record_push(data.len(), true);
                    let remaining = {
                        let mut queue = self.inner.queue.lock();
                        queue.retain(|c, seq| !(data.contains_key(c) && *seq <= seq_at_write));
                        queue.len()
                    };
                    metrics::set_pending_writes(remaining);
                    self.publish_status(false);
                    self.emit(SyncEvent::PushSucceeded {
                        collections: data.keys().copied().collect(),
                    });
                    return Ok(());
                }
                Ok(Err(e)) => {
                    metrics::record_push(data.len(), false);
                    warn!(error = %e, "Batch push failed, queueing for retry");
                }
                Err(_) => {
                    metrics::record_push(data.len(), false);
                    warn!("Batch push timed out, queueing for retry");
                }
            }
            for collection in data.keys() {
                self.enqueue(*collection);
                self.spawn_mirror(collection.as_str().to_string());
            }
            self.schedule_push();
            return Ok(());
        }

        self.mirror_all_bounded(data.keys().copied()).await;
        Ok(())
    }

    /// Mirror `collections` and wait for them, up to the API timeout.
    ///
    /// Mirrors still running at the deadline continue detached.
    async fn mirror_all_bounded(&self, collections: impl Iterator<Item = Collection>) {
        if self.available_remote().is_none() {
            return;
        }
        let handles: Vec<_> = collections
            .filter_map(|collection| {
                let this = self.clone();
                self.spawn_detached("mirror", async move { this.mirror(collection.as_str()).await })
            })
            .collect();

        let pending = handles.len();
        let wait_all = async move {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.inner.config.api_timeout(), wait_all).await.is_err() {
            warn!(mirrors = pending, "Cloud storage mirrors still running after timeout");
        }
    }

    /// Stop background work after one last push attempt.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        info!("Initiating sync coordinator shutdown...");
        self.inner.closed.store(true, Ordering::Release);

        if !self.inner.queue.lock().is_empty() {
            match tokio::time::timeout(self.inner.config.api_timeout(), self.push_pass()).await {
                Ok(Ok(())) => info!("Final push complete"),
                Ok(Err(e)) => warn!(error = %e, "Final push incomplete"),
                Err(_) => warn!("Final push timed out"),
            }
        }

        if let Some(handle) = self.inner.push_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.refresh_task.lock().take() {
            handle.abort();
        }
        self.inner.in_flight.store(false, Ordering::Release);
        self.publish_status(false);
        info!(pending = self.inner.queue.lock().len(), "Sync coordinator shutdown complete");
    }
}

#[derive(Debug, thiserror::Error)]
enum RefreshError {
    #[error("backend unavailable")]
    Unavailable,
    #[error("backend pull timed out")]
    Timeout,
    #[error("backend pull failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
