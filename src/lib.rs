//! # Finance Sync
//!
//! Offline-first storage synchronization for a personal finance mini-app.
//!
//! ## Architecture
//!
//! Eight named collections are kept eventually consistent across three tiers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator                        │
//! │  • get / set / load_all / save_all                         │
//! │  • Pending-write queue + debounced background push         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (synchronous, always first)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Local Cache                          │
//! │  • Source of truth while offline                           │
//! │  • Memory or one-file-per-key directory backend            │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                  │
//!   (mirror task per key)               (push queue, retried)
//!              ▼                                  ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │       Cloud Storage       │   │         Backend API         │
//! │  • 4000-char value limit  │   │  • Whole-set GET / POST     │
//! │  • Chunked when larger    │   │  • Bearer + identity token  │
//! └───────────────────────────┘   └─────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use finance_sync::{
//!     Collection, MemoryBridge, SyncConfig, SyncCoordinator, fixed_identity,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig {
//!         api_url: Some("https://project.example.co".into()),
//!         api_key: Some("anon-key".into()),
//!         ..Default::default()
//!     };
//!
//!     let sync = SyncCoordinator::builder(config)
//!         .remote(Arc::new(MemoryBridge::new(4000)))
//!         .identity(fixed_identity("query_id=AAF...&hash=..."))
//!         .build()?;
//!
//!     // First paint from the local cache; backend refresh runs detached
//!     let data = sync.load_all()?;
//!     println!("{} accounts", data[&Collection::Accounts].as_array().map_or(0, Vec::len));
//!
//!     // Returns as soon as the local cache holds the value
//!     sync.set(Collection::ExpensePlan, &json!(1500))?;
//!
//!     sync.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`SyncConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SyncCoordinator`] orchestrating all tiers
//! - [`collection`]: Named collections, defaults and validation
//! - [`storage`]: Local cache, cloud storage adapter and bridges
//! - [`chunking`]: Split/join codec for size-bounded values
//! - [`backend`]: Backend API client
//! - [`resilience`]: Retry policy for background pushes

pub mod config;
pub mod collection;
pub mod chunking;
pub mod storage;
pub mod backend;
pub mod resilience;
pub mod coordinator;
pub mod metrics;

pub use config::{ConfigError, SyncConfig};
pub use collection::{Collection, CollectionMap, UnknownCollection, sanitize_all};
pub use coordinator::{PushError, SyncCoordinator, SyncCoordinatorBuilder, SyncEvent, SyncStatus};
pub use storage::{
    BoundedStore, BridgeError, CallbackBridge, FileLocalStore, HostCallback, HostStorage, KvBridge,
    LocalBackend, LocalCache, MemoryBridge, MemoryLocalStore, StorageError,
};
pub use backend::{ApiError, CollectionApi, HttpBackend, IdentitySource, fixed_identity, no_identity};
pub use resilience::retry::RetryPolicy;
pub use metrics::LatencyTimer;
