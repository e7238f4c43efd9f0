// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background propagation: the debounced backend push and cloud mirrors.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::collection::{Collection, CollectionMap};
use crate::metrics::{self, TIER_BACKEND, TIER_REMOTE};
use crate::resilience::retry::{retry, RetryPolicy};
use crate::storage::BoundedStore;

use super::{PushError, SyncCoordinator, SyncEvent, SyncStatus};

impl SyncCoordinator {
    /// Mark `collection` dirty with a fresh write sequence.
    pub(super) fn enqueue(&self, collection: Collection) {
        let seq = self.inner.write_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = {
            let mut queue = self.inner.queue.lock();
            queue.insert(collection, seq);
            queue.len()
        };
        metrics::set_pending_writes(pending);
        self.publish_status(false);
    }

    pub(super) fn publish_status(&self, pushing: bool) {
        let status = if pushing {
            SyncStatus::Pushing
        } else if self.inner.queue.lock().is_empty() {
            SyncStatus::Idle
        } else {
            SyncStatus::Pending
        };
        self.inner.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    /// Start the push worker unless one is already scheduled.
    pub(super) fn schedule_push(&self) {
        if self.inner.in_flight.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = self.clone();
        match self.spawn_detached("push", async move { this.push_worker().await }) {
            Some(handle) => *self.inner.push_task.lock() = Some(handle),
            None => self.inner.in_flight.store(false, Ordering::Release),
        }
    }

    async fn push_worker(self) {
        tokio::time::sleep(self.inner.config.push_debounce()).await;

        let policy = RetryPolicy::fixed(
            self.inner.config.push_retry_interval(),
            self.inner.config.max_push_retries,
        );
        let result = retry("backend_push", &policy, || self.push_pass()).await;
        self.inner.in_flight.store(false, Ordering::Release);

        match result {
            Ok(()) => {
                // A write may have landed after the last pass but before the
                // guard was released
                if !self.inner.queue.lock().is_empty() {
                    self.schedule_push();
                }
            }
            Err(e) => {
                error!(error = %e, pending = self.inner.queue.lock().len(), "Push retries exhausted, waiting for next write");
            }
        }
        self.publish_status(false);
    }

    /// One push: snapshot the queue, send current local values, clear what
    /// was not rewritten in the meantime.
    pub(super) async fn push_pass(&self) -> Result<(), PushError> {
        let _guard = self.inner.push_lock.lock().await;

        let Some(backend) = self.available_backend() else {
            return Ok(());
        };

        let snapshot: Vec<(Collection, u64)> = {
            let queue = self.inner.queue.lock();
            queue.iter().map(|(c, seq)| (*c, *seq)).collect()
        };
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut batch = CollectionMap::new();
        for (collection, _) in &snapshot {
            if let Some(value) = self.inner.local.get(collection.as_str())? {
                batch.insert(*collection, value);
            }
        }

        if !batch.is_empty() {
            self.publish_status(true);
            let start = Instant::now();
            let result = backend.push(&batch).await;
            metrics::record_latency(TIER_BACKEND, "push", start.elapsed());

            if let Err(e) = result {
                metrics::record_push(batch.len(), false);
                let pending = self.inner.queue.lock().len();
                self.publish_status(false);
                self.emit(SyncEvent::PushFailed { error: e.clone(), pending });
                return Err(e.into());
            }
            metrics::record_push(batch.len(), true);
        }

        // Entries with no local value have nothing to send and are cleared too
        let remaining = {
            let mut queue = self.inner.queue.lock();
            for (collection, seq) in &snapshot {
                if queue.get(collection) == Some(seq) {
                    queue.remove(collection);
                }
            }
            queue.len()
        };
        metrics::set_pending_writes(remaining);
        self.publish_status(false);

        if !batch.is_empty() {
            let collections: Vec<Collection> = batch.keys().copied().collect();
            info!(collections = collections.len(), remaining, "Backend push complete");
            self.emit(SyncEvent::PushSucceeded { collections });
        }

        if remaining > 0 {
            return Err(PushError::Requeued { remaining });
        }
        Ok(())
    }

    /// Run one push pass now, outside the debounce.
    #[tracing::instrument(skip(self))]
    pub async fn flush(&self) -> Result<(), PushError> {
        self.push_pass().await
    }

    /// Mirror the current local value of `key` to cloud storage in the background.
    pub(super) fn spawn_mirror(&self, key: String) {
        if self.available_remote().is_none() {
            return;
        }
        let this = self.clone();
        self.spawn_detached("mirror", async move { this.mirror(&key).await });
    }

    /// Write the current local text for `key` to cloud storage.
    ///
    /// Holds a per-key lock, and reads the local value only once the lock is
    /// held, so racing mirrors for one key finish with the newest value.
    pub(super) async fn mirror(&self, key: &str) {
        let Some(remote) = self.available_remote() else {
            return;
        };

        let lock = Arc::clone(self.inner.mirror_locks.entry(key.to_string()).or_default().value());
        {
            let _guard = lock.lock().await;
            self.write_mirror(remote, key).await;
        }
        drop(lock);
        // Drop the lock entry once no other mirror of this key holds it
        self.inner.mirror_locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn write_mirror(&self, remote: &BoundedStore, key: &str) {
        let text = match self.inner.local.get_raw(key) {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => {
                warn!(key = %key, error = %e, "Local read for mirror failed");
                return;
            }
        };

        let storage_key = self.inner.local.storage_key(key);
        let _timer = metrics::LatencyTimer::new(TIER_REMOTE, "put");
        match remote.put(&storage_key, &text).await {
            Ok(()) => {
                metrics::record_operation(TIER_REMOTE, "put", "success");
                debug!(key = %key, "Mirrored to cloud storage");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cloud storage mirror failed");
                metrics::record_operation(TIER_REMOTE, "put", "error");
                metrics::record_mirror_failure(&storage_key);
                self.emit(SyncEvent::MirrorFailed { key: key.to_string(), error: e });
            }
        }
    }
}
