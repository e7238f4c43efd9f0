// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage tiers below the coordinator.
//!
//! - [`local`]: synchronous local cache and its backends
//! - [`bounded`]: chunked adapter over the size-bounded cloud store
//! - [`callback`]: bridge from the host's callback API to futures
//! - [`memory`]: in-process backends for host-less runs and tests

pub mod traits;
pub mod local;
pub mod memory;
pub mod bounded;
pub mod callback;

pub use traits::{BridgeError, KvBridge, LocalBackend, StorageError};
pub use local::{FileLocalStore, LocalCache};
pub use memory::{MemoryBridge, MemoryLocalStore};
pub use bounded::BoundedStore;
pub use callback::{CallbackBridge, HostCallback, HostStorage};
