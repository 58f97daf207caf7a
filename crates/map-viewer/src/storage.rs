//! Key/value persistence for view state.
//!
//! Values are plain strings under fixed keys; an absent key means "use the
//! default". The file-backed store keeps every key in one JSON object and
//! rewrites it atomically (named temp file persisted over the target) on
//! each `set`.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub mod keys {
    /// `[lon, lat]` as a JSON array.
    pub const MAP_CENTER: &str = "mapCenter";
    pub const MAP_ZOOM: &str = "mapZoom";
    pub const SELECTED_LAYER: &str = "selectedLayer";
    /// `"yes"` or `"no"`.
    pub const SHOW_TABLE: &str = "showTable";
    pub const OBJECT_FILTER: &str = "objectFilter";
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Volatile store, used in tests and when no state file is wanted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object file on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: IndexMap<String, String>,
}

impl FileStore {
    /// Opens `path`. A missing or unreadable file starts empty; a corrupt one
    /// is logged and ignored (it is overwritten by the next `set`).
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();

        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                log::warn!("Ignoring corrupt state file {}: {}", path.display(), err);
                IndexMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No state file at {}, starting from defaults", path.display());
                IndexMap::new()
            }
            Err(err) => {
                log::warn!("Cannot read state file {}: {}", path.display(), err);
                IndexMap::new()
            }
        };

        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(&self.values)?;
        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let write = || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
            tmp.write_all(text.as_bytes())?;
            tmp.persist(&self.path).map_err(|err| err.error)?;
            Ok(())
        };

        write().map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get(keys::MAP_ZOOM), None);
        store.set(keys::MAP_ZOOM, "12").unwrap();
        assert_eq!(store.get(keys::MAP_ZOOM).as_deref(), Some("12"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = FileStore::open(&path);
        store.set(keys::SELECTED_LAYER, "layer2").unwrap();
        store.set(keys::OBJECT_FILTER, "парк").unwrap();
        drop(store);

        let store = FileStore::open(&path);
        assert_eq!(store.get(keys::SELECTED_LAYER).as_deref(), Some("layer2"));
        assert_eq!(store.get(keys::OBJECT_FILTER).as_deref(), Some("парк"));

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "no temp files left behind");
    }

    #[test]
    fn state_file_with_tmp_extension_is_replaced_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.tmp");

        let mut store = FileStore::open(&path);
        store.set(keys::MAP_ZOOM, "11").unwrap();
        store.set(keys::SHOW_TABLE, "yes").unwrap();

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get(keys::MAP_ZOOM).as_deref(), Some("11"));
        assert_eq!(reopened.get(keys::SHOW_TABLE).as_deref(), Some("yes"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn two_stores_on_one_file_keep_a_valid_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut first = FileStore::open(&path);
        let mut second = FileStore::open(&path);
        first.set(keys::SELECTED_LAYER, "layer1").unwrap();
        second.set(keys::SELECTED_LAYER, "layer3").unwrap();

        // Last writer wins; the file is never a mix of both.
        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get(keys::SELECTED_LAYER).as_deref(), Some("layer3"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ definitely not json").unwrap();

        let mut store = FileStore::open(&path);
        assert_eq!(store.get(keys::SHOW_TABLE), None);

        store.set(keys::SHOW_TABLE, "no").unwrap();
        assert_eq!(FileStore::open(&path).get(keys::SHOW_TABLE).as_deref(), Some("no"));
    }

    #[test]
    fn unwritable_location_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("missing-dir").join("state.json"));
        assert!(matches!(
            store.set(keys::MAP_ZOOM, "3"),
            Err(StorageError::Write { .. })
        ));
    }
}
