// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync coordinator.

use thiserror::Error;

use crate::backend::ApiError;
use crate::collection::{Collection, CollectionMap};
use crate::storage::StorageError;

/// Backend push state, for "sync pending" indicators.
///
/// Use [`super::SyncCoordinator::status()`] to read it or
/// [`super::SyncCoordinator::status_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing waiting for the backend
    Idle,
    /// Local writes queued for a push
    Pending,
    /// A push request is in flight
    Pushing,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Pending => write!(f, "Pending"),
            Self::Pushing => write!(f, "Pushing"),
        }
    }
}

/// Background outcomes that never surface as errors from the caller's API.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Queued collections reached the backend
    PushSucceeded { collections: Vec<Collection> },
    /// A push pass failed; `pending` collections stay queued
    PushFailed { error: ApiError, pending: usize },
    /// Mirroring a key to cloud storage failed
    MirrorFailed { key: String, error: StorageError },
    /// A cloud chunk set was missing a fragment
    ChunkSetIncomplete { key: String, index: usize },
    /// Background refresh after `load_all` replaced local data
    Refreshed(CollectionMap),
}

/// Outcome of one push pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PushError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Collections were written again while the pass was in flight
    #[error("{remaining} collection(s) written during push, re-queued")]
    Requeued { remaining: usize },
}
