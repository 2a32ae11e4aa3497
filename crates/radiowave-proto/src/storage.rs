//! Persisted key-value entries.
//!
//! Favorites and theme are each stored as one JSON string under a fixed key.
//! Stores depend on the [`KeyValueStore`] trait so tests and embedding hosts
//! can provide their own backing.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PersistenceError;

pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Durably replaces the value before returning.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Read and decode a JSON value, degrading to `None` on any failure.
pub fn load_json_or_default<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("storage: {}", e);
            return None;
        }
    };
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(source) => {
            let err = PersistenceError::Malformed {
                key: key.to_string(),
                source,
            };
            warn!("storage: {}, using default", err);
            None
        }
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string(value).map_err(|source| PersistenceError::Malformed {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &json)
}

// ── file store ───────────────────────────────────────────────────────────────

/// One `<key>.json` file per key inside a directory.
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

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    fn io_error(key: &str, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(key, e))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|e| Self::io_error(key, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| Self::io_error(key, e))?;
        debug!("storage: wrote {} ({} bytes)", path.display(), value.len());
        Ok(())
    }
}

// ── memory store ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));
        assert_eq!(store.get("radio-favorites").unwrap(), None);

        store.set("radio-favorites", r#"["a","b"]"#).unwrap();
        assert_eq!(
            store.get("radio-favorites").unwrap().as_deref(),
            Some(r#"["a","b"]"#)
        );
        assert!(dir.path().join("state").join("radio-favorites.json").exists());
        assert!(!dir.path().join("state").join("radio-favorites.json.tmp").exists());
    }

    #[test]
    fn test_file_store_sanitizes_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set("../escape", "1").unwrap();
        assert!(dir.path().join("___escape.json").exists());
    }

    #[test]
    fn test_load_json_degrades_on_malformed() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        let loaded: Option<Vec<String>> = load_json_or_default(&store, "k");
        assert!(loaded.is_none());

        store.set("k", "   ").unwrap();
        let loaded: Option<Vec<String>> = load_json_or_default(&store, "k");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_then_load_json() {
        let store = MemoryStore::new();
        save_json(&store, "k", &vec!["x".to_string()]).unwrap();
        let loaded: Option<Vec<String>> = load_json_or_default(&store, "k");
        assert_eq!(loaded, Some(vec!["x".to_string()]));
    }
}
