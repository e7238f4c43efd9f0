// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::collection::{Collection, CollectionMap};
use crate::config::{ConfigError, SyncConfig};
use super::{ApiError, CollectionApi, IdentitySource};

const NOT_SUBSCRIBED: &str = "NOT_SUBSCRIBED";

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// reqwest client for the sync endpoint.
///
/// Every request carries `Authorization: Bearer <api_key>` and the identity
/// header, and is bounded by the configured timeout.
pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: Option<Url>,
    api_key: Option<String>,
    identity_header: String,
    identity: Arc<dyn IdentitySource>,
}

impl HttpBackend {
    pub fn new(config: &SyncConfig, identity: Arc<dyn IdentitySource>) -> Result<Self, ConfigError> {
        let endpoint = match (&config.api_url, config.has_backend()) {
            (Some(base), true) => {
                let raw = format!("{}{}", base.trim_end_matches('/'), config.sync_path);
                Some(Url::parse(&raw).map_err(|_| ConfigError::InvalidApiUrl(raw))?)
            }
            _ => None,
        };

        let http = reqwest::Client::builder()
            .timeout(config.api_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            identity_header: config.identity_header.clone(),
            identity,
        })
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    fn request(&self, method: Method) -> Result<RequestBuilder, ApiError> {
        let (Some(url), Some(key)) = (&self.endpoint, &self.api_key) else {
            return Err(ApiError::NotConfigured);
        };
        let token = self.identity.token().ok_or(ApiError::Unauthenticated)?;
        Ok(self
            .http
            .request(method, url.clone())
            .bearer_auth(key)
            .header(self.identity_header.as_str(), token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        request.send().await.map_err(transport_error)
    }

    /// Server reachable: 2xx, or 403 (reachable but entitlement missing).
    pub async fn probe(&self) -> bool {
        let Ok(request) = self.request(Method::GET) else {
            return false;
        };
        match self.send(request).await {
            Ok(response) => {
                let status = response.status();
                status.is_success() || status == StatusCode::FORBIDDEN
            }
            Err(e) => {
                debug!(error = %e, "Backend probe failed");
                false
            }
        }
    }

    /// `Some(true)` when a pull succeeds, `Some(false)` when the server denies
    /// access, `None` when it could not be determined.
    pub async fn check_entitlement(&self) -> Option<bool> {
        match self.pull().await {
            Ok(_) => Some(true),
            Err(ApiError::AccessDenied) => Some(false),
            Err(e) => {
                debug!(error = %e, "Entitlement undetermined");
                None
            }
        }
    }
}

#[async_trait]
impl CollectionApi for HttpBackend {
    fn is_available(&self) -> bool {
        self.endpoint.is_some() && self.api_key.is_some() && self.identity.token().is_some()
    }

    async fn pull(&self) -> Result<CollectionMap, ApiError> {
        let response = check_status(self.send(self.request(Method::GET)?).await?).await?;
        let body = response.text().await.map_err(transport_error)?;
        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        let Value::Object(entries) = parsed else {
            return Err(ApiError::MalformedResponse("expected a JSON object".into()));
        };

        let collections = collect_known(entries);
        debug!(collections = collections.len(), "Backend pull");
        Ok(collections)
    }

    async fn push(&self, partial: &CollectionMap) -> Result<(), ApiError> {
        if partial.is_empty() {
            return Ok(());
        }
        let request = self.request(Method::POST)?.json(partial);
        check_status(self.send(request).await?).await?;
        debug!(collections = partial.len(), "Backend push");
        Ok(())
    }
}

/// Keep non-null values of recognized collections.
fn collect_known(entries: Map<String, Value>) -> CollectionMap {
    entries
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(name, value)| match name.parse::<Collection>() {
            Ok(collection) => Some((collection, value)),
            Err(_) => {
                debug!(key = %name, "Ignoring unknown collection from backend");
                None
            }
        })
        .collect()
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    if parsed.code.as_deref() == Some(NOT_SUBSCRIBED) {
        return Err(ApiError::AccessDenied);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthenticated);
    }

    let message = parsed
        .error
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    warn!(status = status.as_u16(), message = %message, "Backend request failed");
    Err(ApiError::Service {
        status: status.as_u16(),
        message,
    })
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Service {
            status: 0,
            message: e.to_string(),
        }
    }
}
