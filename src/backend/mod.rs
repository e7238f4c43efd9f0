// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend API tier: one endpoint that exchanges the whole collection set.
//!
//! `GET` returns an object keyed by collection name (null when the server
//! has nothing stored); `POST` accepts any subset and upserts it. Error
//! bodies look like `{"error": "...", "code": "NOT_SUBSCRIBED"}`.

pub mod http;

pub use http::HttpBackend;

use std::sync::Arc;
use async_trait::async_trait;
use thiserror::Error;

use crate::collection::CollectionMap;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Endpoint or credential missing from configuration.
    #[error("backend API not configured")]
    NotConfigured,
    /// No identity token available, or the server rejected it.
    #[error("not authenticated")]
    Unauthenticated,
    /// The user lacks the entitlement the server requires.
    #[error("access denied: NOT_SUBSCRIBED")]
    AccessDenied,
    #[error("backend request timed out")]
    Timeout,
    /// Any other non-success. `status` is 0 for transport failures.
    #[error("backend error ({status}): {message}")]
    Service { status: u16, message: String },
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// Entitlement failures will not succeed on retry until the user acts.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied)
    }
}

/// Whole-set exchange with the backend service.
#[async_trait]
pub trait CollectionApi: Send + Sync {
    /// Configured and holding an identity token.
    fn is_available(&self) -> bool;

    /// Fetch every collection the server has a value for.
    async fn pull(&self) -> Result<CollectionMap, ApiError>;

    /// Upsert the supplied collections. An empty map is a no-op.
    async fn push(&self, partial: &CollectionMap) -> Result<(), ApiError>;
}

/// Supplies the host's opaque signed identity token per request.
///
/// The token is forwarded untouched; it is never parsed or verified here.
pub trait IdentitySource: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> IdentitySource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Identity source that always yields the same token.
pub fn fixed_identity(token: impl Into<String>) -> Arc<dyn IdentitySource> {
    let token = token.into();
    Arc::new(move || Some(token.clone()))
}

/// Identity source for running outside the chat client.
pub fn no_identity() -> Arc<dyn IdentitySource> {
    Arc::new(|| None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_identity() {
        assert_eq!(fixed_identity("query_id=1&hash=abc").token().as_deref(), Some("query_id=1&hash=abc"));
        assert!(no_identity().token().is_none());
    }

    #[test]
    fn test_closure_identity() {
        let source = || Some("t".to_string());
        assert_eq!(source.token().as_deref(), Some("t"));
    }

    #[test]
    fn test_access_denied() {
        assert!(ApiError::AccessDenied.is_access_denied());
        assert!(!ApiError::Timeout.is_access_denied());
        assert_eq!(
            ApiError::Service { status: 500, message: "boom".into() }.to_string(),
            "backend error (500): boom"
        );
    }
}
