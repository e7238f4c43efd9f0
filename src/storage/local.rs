// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local cache tier.
//!
//! [`LocalCache`] namespaces keys with the configured prefix and converts
//! between JSON values and the stored text. Strings are stored verbatim;
//! everything else as JSON text. On read, text that is not valid JSON is
//! returned as a plain string so legacy values survive.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use super::traits::{LocalBackend, StorageError};

/// Prefix-scoped JSON view over a [`LocalBackend`].
#[derive(Clone)]
pub struct LocalCache {
    backend: Arc<dyn LocalBackend>,
    prefix: String,
}

impl LocalCache {
    pub fn new(backend: Arc<dyn LocalBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    #[inline]
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Text representation written for `value`.
    #[must_use]
    pub fn encode(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Parse stored text, falling back to a plain string.
    #[must_use]
    pub fn decode(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }

    pub fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.set_raw(key, &Self::encode(value))
    }

    pub fn set_raw(&self, key: &str, text: &str) -> Result<(), StorageError> {
        self.backend.set_raw(&self.storage_key(key), text)
    }

    /// Stored text, with empty entries treated as absent.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .backend
            .get_raw(&self.storage_key(key))?
            .filter(|text| !text.is_empty()))
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.get_raw(key)?.map(|text| Self::decode(&text)))
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove(&self.storage_key(key))
    }

    /// Read several keys in one synchronous pass (first paint).
    pub fn get_all_sync(&self, keys: &[&str]) -> Result<HashMap<String, Option<Value>>, StorageError> {
        keys.iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }
}

/// Directory-backed local store: one file per key.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// reader never sees a half-written value.
pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| fatal("create local cache dir", &dir, &e))?;
        debug!(path = %dir.display(), "File-backed local cache opened");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(encode_file_name(key))
    }
}

impl LocalBackend for FileLocalStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(fatal("read", &path, &e)),
        }
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        // One temp file per write; concurrent writers of a key must not share it
        let write = || -> io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(value.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| fatal("write", &path, &e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(fatal("remove", &path, &e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| fatal("list", &self.dir, &e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| fatal("list", &self.dir, &e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // In-flight temp files; encoded names never start with '.'
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = decode_file_name(name) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

fn fatal(action: &str, path: &Path, err: &io::Error) -> StorageError {
    StorageError::LocalWriteFatal(format!("{} {}: {}", action, path.display(), err))
}

/// Escape everything outside `[A-Za-z0-9_-]` as `%XX`.
fn encode_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_file_name(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
