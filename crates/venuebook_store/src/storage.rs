//! Namespaced key-value persistence.
//!
//! Each namespace holds one JSON record. Versioned records are wrapped in an
//! envelope `{"state": ..., "version": N}` so that older data can be migrated
//! on read.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::StoreError;

/// Durable storage for namespaced JSON records.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, namespace: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, namespace: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, namespace: &str) -> Result<(), StoreError>;
}

/// One `<namespace>.json` file per record inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.json", namespace))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(namespace)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, namespace: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        // Write then rename so a crash never leaves a truncated record behind
        let target = self.path_for(namespace);
        let tmp = self.dir.join(format!("{}.json.tmp", namespace));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &target)?;
        debug!("persisted '{}' to {}", namespace, target.display());
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(namespace)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local storage, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(namespace).cloned())
    }

    fn write(&self, namespace: &str, value: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(namespace.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.remove(namespace);
        Ok(())
    }
}

/// Persisted wrapper of a versioned record.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub state: T,
    #[serde(default)]
    pub version: u32,
}

/// Reads a plain JSON record.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    namespace: &str,
) -> Result<Option<T>, StoreError> {
    match store.read(namespace)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    namespace: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.write(namespace, &serde_json::to_string(value)?)
}

/// Reads a versioned record, running `migrate` when it was stored by an older
/// schema. Records without an envelope are treated as version 0.
///
/// `migrate` receives the stored state and its version and returns the state
/// in the current shape.
pub fn load_versioned<T, F>(
    store: &dyn KeyValueStore,
    namespace: &str,
    current_version: u32,
    migrate: F,
) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    F: FnOnce(Value, u32) -> Result<Value, StoreError>,
{
    let Some(raw) = store.read(namespace)? else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(&raw)?;
    let (state, version) = match value {
        Value::Object(mut map) if map.contains_key("state") => {
            let stored = map.get("version").and_then(Value::as_u64).unwrap_or(0);
            let version = u32::try_from(stored).map_err(|_| StoreError::UnsupportedVersion {
                namespace: namespace.to_string(),
                version: stored,
            })?;
            (map.remove("state").unwrap_or(Value::Null), version)
        }
        bare => (bare, 0),
    };

    if version > current_version {
        return Err(StoreError::UnsupportedVersion {
            namespace: namespace.to_string(),
            version: u64::from(version),
        });
    }
    let state = if version < current_version {
        info!(
            "migrating '{}' from version {} to {}",
            namespace, version, current_version
        );
        migrate(state, version)?
    } else {
        state
    };
    Ok(Some(serde_json::from_value(state)?))
}

pub fn save_versioned<T: Serialize>(
    store: &dyn KeyValueStore,
    namespace: &str,
    version: u32,
    state: &T,
) -> Result<(), StoreError> {
    save_json(store, namespace, &Envelope { state, version })
}
