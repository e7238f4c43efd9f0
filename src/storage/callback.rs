// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Adapter from the host's callback-style cloud storage to [`KvBridge`].
//!
//! The chat client exposes `setItem/getItem/getItems/removeItem`, each
//! completing through a callback `(error, result)`. [`CallbackBridge`] turns
//! every call into a future backed by a `oneshot` channel. A callback that
//! is dropped without firing surfaces as [`BridgeError::Transport`].

use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use super::traits::{BridgeError, KvBridge};

/// Completion callback: `(error, result)`. `error` is `Some` on failure.
pub type HostCallback<T> = Box<dyn FnOnce(Option<String>, T) + Send + 'static>;

/// Callback-style storage primitives provided by the host platform.
pub trait HostStorage: Send + Sync {
    /// Whether the host exposes cloud storage at all.
    fn is_supported(&self) -> bool;

    fn set_item(&self, key: &str, value: &str, callback: HostCallback<bool>);
    fn get_item(&self, key: &str, callback: HostCallback<Option<String>>);
    fn get_items(&self, keys: &[String], callback: HostCallback<HashMap<String, String>>);
    fn remove_item(&self, key: &str, callback: HostCallback<bool>);
}

pub struct CallbackBridge<H> {
    host: H,
}

impl<H: HostStorage> CallbackBridge<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn ensure_supported(&self) -> Result<(), BridgeError> {
        if self.host.is_supported() {
            Ok(())
        } else {
            Err(BridgeError::Unavailable)
        }
    }
}

/// Build a callback/receiver pair for one host call.
fn completion<T: Send + 'static>() -> (HostCallback<T>, oneshot::Receiver<(Option<String>, T)>) {
    let (tx, rx) = oneshot::channel();
    let callback: HostCallback<T> = Box::new(move |err, result| {
        // Receiver gone means the caller stopped waiting
        let _ = tx.send((err, result));
    });
    (callback, rx)
}

async fn settle<T>(op: &str, rx: oneshot::Receiver<(Option<String>, T)>) -> Result<T, BridgeError> {
    match rx.await {
        Ok((None, result)) => Ok(result),
        Ok((Some(err), _)) => Err(classify(&err)),
        Err(_) => {
            debug!(op, "Host dropped storage callback");
            Err(BridgeError::Transport(format!("{} callback dropped", op)))
        }
    }
}

fn classify(err: &str) -> BridgeError {
    let lower = err.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("not_found") {
        BridgeError::NotFound
    } else {
        BridgeError::Transport(err.to_string())
    }
}

#[async_trait]
impl<H: HostStorage> KvBridge for CallbackBridge<H> {
    fn is_available(&self) -> bool {
        self.host.is_supported()
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        self.ensure_supported()?;
        let (callback, rx) = completion::<bool>();
        self.host.set_item(key, value, callback);
        settle("setItem", rx).await.map(|_| ())
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>, BridgeError> {
        self.ensure_supported()?;
        let (callback, rx) = completion::<Option<String>>();
        self.host.get_item(key, callback);
        match settle("getItem", rx).await {
            Ok(value) => Ok(value),
            Err(BridgeError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_items(&self, keys: &[String]) -> Result<HashMap<String, String>, BridgeError> {
        self.ensure_supported()?;
        let (callback, rx) = completion::<HashMap<String, String>>();
        self.host.get_items(keys, callback);
        settle("getItems", rx).await
    }

    async fn remove_item(&self, key: &str) -> Result<bool, BridgeError> {
        self.ensure_supported()?;
        let (callback, rx) = completion::<bool>();
        self.host.remove_item(key, callback);
        match settle("removeItem", rx).await {
            Ok(removed) => Ok(removed),
            Err(BridgeError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
