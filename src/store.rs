//! Settings store adapter.
//!
//! The persisted configuration blob lives behind a two-level key:
//! `namespace` → `key` → JSON value. The pipeline only ever reads it; the
//! administrative surface writes it. There is no optimistic concurrency:
//! the last writer wins.
//!
//! [`JsonFileStore`] keeps every namespace in one JSON document on disk:
//!
//! ```text
//! .img-convert/
//! └── store.json      {"plugin::img-convert": {"settings": {...}}}
//! ```
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write never leaves a truncated document behind. Reads report a
//! corrupt document as an error; a write replaces it, keeping the unreadable
//! bytes as `store.json.bak`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

pub const STORE_FILENAME: &str = "store.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store document is not a JSON object: {0}")]
    Malformed(PathBuf),
}

/// Get/set of persisted configuration values.
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when nothing was ever stored under this key.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Store backed by a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store rooted at `dir`; the file is created on first write.
    pub fn open(dir: &Path) -> Self {
        Self {
            path: dir.join(STORE_FILENAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::Malformed(self.path.clone())),
        }
    }

    fn save(&self, doc: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let doc = self.load()?;
        Ok(doc
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = match self.load() {
            Ok(doc) => doc,
            Err(e @ (StoreError::Json(_) | StoreError::Malformed(_))) => {
                let backup = self.path.with_extension("json.bak");
                warn!(
                    "Replacing unreadable store {} ({e}), old contents kept in {}",
                    self.path.display(),
                    backup.display()
                );
                fs::copy(&self.path, &backup)?;
                Map::new()
            }
            Err(e) => return Err(e),
        };
        let ns = doc
            .entry(namespace.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !ns.is_object() {
            *ns = Value::Object(Map::new());
        }
        if let Value::Object(entries) = ns {
            entries.insert(key.to_string(), value);
        }
        self.save(&doc)
    }
}

/// In-process store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<(String, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}
