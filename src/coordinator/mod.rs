// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator.
//!
//! The [`SyncCoordinator`] ties the three tiers together:
//! - Local cache: synchronous, always written first, answers reads
//! - Cloud storage: chunked mirror of every write, fallback on cold start
//! - Backend API: whole-set exchange, fed by a debounced push queue
//!
//! # Write path
//!
//! ```text
//! set(c, v) ──► local cache ──► Ok(())
//!                  │
//!                  ├─► queue[c] = seq ──► (debounce) ──► push pass ──► backend
//!                  │                                        ▲   │ fail / re-queued
//!                  │                                        └───┘ retry every push_retry_ms
//!                  └─► mirror task (per-key lock) ──► cloud storage
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use finance_sync::{Collection, SyncConfig, SyncCoordinator};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sync = SyncCoordinator::builder(SyncConfig::default()).build()?;
//!
//! let data = sync.load_all()?;
//! assert_eq!(data[&Collection::ExpensePlan], json!(0));
//!
//! sync.set(Collection::ExpensePlan, &json!(1500))?;
//! assert_eq!(sync.get(Collection::ExpensePlan).await?, Some(json!(1500)));
//! # Ok(())
//! # }
//! ```

mod types;
mod flush;
mod lifecycle;

pub use types::{PushError, SyncEvent, SyncStatus};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{CollectionApi, HttpBackend, IdentitySource};
use crate::collection::Collection;
use crate::config::{ConfigError, SyncConfig};
use crate::metrics::{self, TIER_BACKEND, TIER_LOCAL, TIER_REMOTE};
use crate::storage::{
    BoundedStore, FileLocalStore, KvBridge, LocalBackend, LocalCache, MemoryLocalStore, StorageError,
};

const EVENT_CAPACITY: usize = 64;

/// Offline-first coordinator over the local cache, cloud storage and backend.
///
/// Cheap to clone; clones share state. Background work (pushes, mirrors,
/// refreshes) is spawned on the ambient Tokio runtime. Outside a runtime the
/// local cache still works and background work is skipped.
#[derive(Clone)]
pub struct SyncCoordinator {
    pub(super) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(super) config: SyncConfig,

    pub(super) local: LocalCache,

    /// Cloud storage (optional)
    pub(super) remote: Option<BoundedStore>,

    /// Backend API (optional)
    pub(super) backend: Option<Arc<dyn CollectionApi>>,

    /// Collections newer locally than the backend, with their write sequence
    pub(super) queue: Mutex<HashMap<Collection, u64>>,

    pub(super) write_seq: AtomicU64,

    /// Push worker scheduled or running
    pub(super) in_flight: AtomicBool,

    /// Serializes push passes between the worker and `flush()`
    pub(super) push_lock: tokio::sync::Mutex<()>,

    pub(super) mirror_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,

    pub(super) status_tx: watch::Sender<SyncStatus>,
    pub(super) status_rx: watch::Receiver<SyncStatus>,

    pub(super) events: broadcast::Sender<SyncEvent>,

    pub(super) push_task: Mutex<Option<JoinHandle<()>>>,
    pub(super) refresh_task: Mutex<Option<JoinHandle<()>>>,

    pub(super) closed: AtomicBool,
}

/// Assembles a [`SyncCoordinator`] from its tiers.
pub struct SyncCoordinatorBuilder {
    config: SyncConfig,
    local: Option<Arc<dyn LocalBackend>>,
    bridge: Option<Arc<dyn KvBridge>>,
    backend: Option<Arc<dyn CollectionApi>>,
    identity: Option<Arc<dyn IdentitySource>>,
}

impl SyncCoordinatorBuilder {
    /// Local cache backend. Defaults to a file store at `local_path`, or memory.
    #[must_use]
    pub fn local(mut self, backend: Arc<dyn LocalBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    /// Cloud storage bridge.
    #[must_use]
    pub fn remote(mut self, bridge: Arc<dyn KvBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Backend API implementation.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn CollectionApi>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build an [`HttpBackend`] from the config using this identity source.
    /// Ignored when [`backend`](Self::backend) is also set.
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn build(self) -> Result<SyncCoordinator, ConfigError> {
        self.config.validate()?;

        let local: Arc<dyn LocalBackend> = match (self.local, &self.config.local_path) {
            (Some(backend), _) => backend,
            (None, Some(path)) => Arc::new(
                FileLocalStore::open(path).map_err(|e| ConfigError::LocalStore(e.to_string()))?,
            ),
            (None, None) => Arc::new(MemoryLocalStore::new()),
        };

        let backend = match (self.backend, self.identity) {
            (Some(backend), _) => Some(backend),
            (None, Some(identity)) if self.config.has_backend() => {
                Some(Arc::new(HttpBackend::new(&self.config, identity)?) as Arc<dyn CollectionApi>)
            }
            _ => None,
        };

        let remote = self.bridge.map(|bridge| {
            BoundedStore::new(bridge, self.config.remote_value_limit)
                .with_cleanup_probe_limit(self.config.remote_cleanup_probe_limit)
        });

        let (status_tx, status_rx) = watch::channel(SyncStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        debug!(
            has_remote = remote.is_some(),
            has_backend = backend.is_some(),
            "Sync coordinator created"
        );

        Ok(SyncCoordinator {
            inner: Arc::new(Inner {
                local: LocalCache::new(local, self.config.key_prefix.clone()),
                config: self.config,
                remote,
                backend,
                queue: Mutex::new(HashMap::new()),
                write_seq: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
                push_lock: tokio::sync::Mutex::new(()),
                mirror_locks: DashMap::new(),
                status_tx,
                status_rx,
                events,
                push_task: Mutex::new(None),
                refresh_task: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl SyncCoordinator {
    pub fn builder(config: SyncConfig) -> SyncCoordinatorBuilder {
        SyncCoordinatorBuilder {
            config,
            local: None,
            bridge: None,
            backend: None,
            identity: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Direct access to the local cache tier.
    #[must_use]
    pub fn local(&self) -> &LocalCache {
        &self.inner.local
    }

    /// Cloud storage capability probe.
    #[must_use]
    pub fn is_remote_available(&self) -> bool {
        self.inner.remote.as_ref().is_some_and(BoundedStore::is_available)
    }

    /// Alias of [`is_remote_available`](Self::is_remote_available).
    #[must_use]
    pub fn is_cloud_available(&self) -> bool {
        self.is_remote_available()
    }

    #[must_use]
    pub fn is_backend_available(&self) -> bool {
        self.available_backend().is_some()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.inner.status_rx.borrow()
    }

    pub fn status_receiver(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Collections waiting for a backend push, in wire order.
    #[must_use]
    pub fn pending(&self) -> Vec<Collection> {
        let queue = self.inner.queue.lock();
        Collection::ALL.into_iter().filter(|c| queue.contains_key(c)).collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Write a collection. Returns once the local cache holds the value.
    pub fn set(&self, collection: Collection, value: &Value) -> Result<(), StorageError> {
        self.set_item(collection.as_str(), value)
    }

    /// Write any key. Only collection names are queued for the backend.
    #[tracing::instrument(skip(self, value))]
    pub fn set_item(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let _timer = metrics::LatencyTimer::new(TIER_LOCAL, "set");
        self.inner.local.set(key, value)?;
        metrics::record_operation(TIER_LOCAL, "set", "success");

        if let Ok(collection) = key.parse::<Collection>() {
            if self.available_backend().is_some() {
                self.enqueue(collection);
                self.schedule_push();
            }
        }
        self.spawn_mirror(key.to_string());
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    /// Read a collection.
    ///
    /// A damaged cloud chunk set yields the built-in default and a
    /// [`SyncEvent::ChunkSetIncomplete`].
    pub async fn get(&self, collection: Collection) -> Result<Option<Value>, StorageError> {
        match self.get_item(collection.as_str()).await {
            Err(StorageError::IncompleteChunkSet { key, index }) => {
                warn!(key = %key, index, "Incomplete chunk set, using default");
                self.emit(SyncEvent::ChunkSetIncomplete { key, index });
                Ok(Some(collection.default_value()))
            }
            other => other,
        }
    }

    /// Read any key: local cache, then backend, then cloud storage.
    ///
    /// A value found remotely is written to the local cache before returning.
    /// Remote failures are logged and treated as misses, except a damaged
    /// chunk set which is returned as [`StorageError::IncompleteChunkSet`].
    #[tracing::instrument(skip(self), fields(tier))]
    pub async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        if let Some(value) = self.inner.local.get(key)? {
            tracing::Span::current().record("tier", TIER_LOCAL);
            metrics::record_operation(TIER_LOCAL, "get", "hit");
            return Ok(Some(value));
        }
        metrics::record_operation(TIER_LOCAL, "get", "miss");

        if let Ok(collection) = key.parse::<Collection>() {
            if let Some(value) = self.pull_one(collection).await {
                self.inner.local.set(key, &value)?;
                tracing::Span::current().record("tier", TIER_BACKEND);
                return Ok(Some(value));
            }
        }

        if let Some(text) = self.fetch_remote(key).await? {
            self.inner.local.set_raw(key, &text)?;
            tracing::Span::current().record("tier", TIER_REMOTE);
            return Ok(Some(LocalCache::decode(&text)));
        }

        debug!(key = %key, "Not found in any tier");
        Ok(None)
    }

    /// Backend value for one collection, bounded by the API timeout.
    async fn pull_one(&self, collection: Collection) -> Option<Value> {
        let backend = self.available_backend()?;
        let _timer = metrics::LatencyTimer::new(TIER_BACKEND, "pull");
        match tokio::time::timeout(self.inner.config.api_timeout(), backend.pull()).await {
            Ok(Ok(mut all)) => {
                let found = all.remove(&collection);
                metrics::record_operation(TIER_BACKEND, "pull", if found.is_some() { "hit" } else { "miss" });
                found
            }
            Ok(Err(e)) => {
                warn!(collection = %collection, error = %e, "Backend pull failed");
                metrics::record_operation(TIER_BACKEND, "pull", "error");
                None
            }
            Err(_) => {
                warn!(collection = %collection, "Backend pull timed out");
                metrics::record_operation(TIER_BACKEND, "pull", "error");
                None
            }
        }
    }

    /// Cloud storage text for `key`. Only a damaged chunk set is an error.
    pub(super) async fn fetch_remote(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some(remote) = self.available_remote() else {
            return Ok(None);
        };
        let storage_key = self.inner.local.storage_key(key);
        let _timer = metrics::LatencyTimer::new(TIER_REMOTE, "fetch");
        match remote.fetch(&storage_key).await {
            Ok(found) => {
                metrics::record_operation(TIER_REMOTE, "fetch", if found.is_some() { "hit" } else { "miss" });
                Ok(found)
            }
            Err(e @ StorageError::IncompleteChunkSet { .. }) => {
                metrics::record_incomplete_chunk_set(&storage_key);
                Err(e)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cloud storage read failed");
                metrics::record_operation(TIER_REMOTE, "fetch", "error");
                Ok(None)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals shared by flush.rs and lifecycle.rs
    // ═══════════════════════════════════════════════════════════════════════

    pub(super) fn available_backend(&self) -> Option<Arc<dyn CollectionApi>> {
        self.inner.backend.as_ref().filter(|b| b.is_available()).cloned()
    }

    pub(super) fn available_remote(&self) -> Option<&BoundedStore> {
        self.inner.remote.as_ref().filter(|r| r.is_available())
    }

    pub(super) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Spawn on the ambient runtime, if there is one.
    pub(super) fn spawn_detached<F>(&self, what: &str, future: F) -> Option<JoinHandle<()>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            debug!(task = what, "Coordinator shut down, not spawning");
            return None;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(future)),
            Err(_) => {
                warn!(task = what, "No Tokio runtime, background task skipped");
                None
            }
        }
    }
}
