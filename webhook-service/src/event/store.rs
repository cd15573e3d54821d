//! Key-value persistence for the event log and settings.
//!
//! Values are JSON documents addressed by a string key. Two backends:
//! - `MemoryStore`: process-local, used when no data directory is configured
//! - `JsonFileStore`: one `<key>.json` file per key inside a data directory

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde_json::Value;
use thiserror::Error;

/// Key holding the persisted event log.
pub const EVENTS_KEY: &str = "webhook_events";

/// Key holding the operator-configured webhook signing secret.
pub const WEBHOOK_SECRET_KEY: &str = "webhook_secret";

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored value for '{key}' is malformed: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Generic key-value store over JSON values.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// =============================================================================
// In-memory Store
// =============================================================================

/// In-memory store.
///
/// Can be switched to an unavailable state to exercise storage failures.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        let values = self
            .values
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.check()?;
        let mut values = self
            .values
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut values = self
            .values
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}

// =============================================================================
// JSON File Store
// =============================================================================

/// File-backed store writing one pretty-printed JSON file per key.
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) the data directory.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|e| {
            StoreError::Unavailable(format!(
                "failed to create data dir {}: {e}",
                data_dir.display()
            ))
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| StoreError::Unavailable(format!("failed to read {key}.json: {e}")))?;
        let value = serde_json::from_str(&content).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let content =
            serde_json::to_string_pretty(&value).map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            })?;

        // Write-then-rename so readers never see a half-written file
        let path = self.path_for(key);
        let tmp = self.data_dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, content)
            .map_err(|e| StoreError::Unavailable(format!("failed to write {key}.json: {e}")))?;
        fs::rename(&tmp, &path)
            .map_err(|e| StoreError::Unavailable(format!("failed to replace {key}.json: {e}")))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path)
            .map_err(|e| StoreError::Unavailable(format!("failed to delete {key}.json: {e}")))
    }
}
