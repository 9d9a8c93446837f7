//! File-backed storage backend.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

use super::{CHANGE_CHANNEL_CAPACITY, KeyValueStore, StorageError, StorageEvent};

/// Write-through key-value store persisted as one JSON object.
///
/// Each mutation rewrites the whole file through a temp-file-and-rename
/// dance, so the file on disk is always a complete, parseable snapshot.
/// The in-memory map is the read path; [`JsonFileStore::refresh`] reconciles
/// it with the file when another process may have written it.
#[derive(Clone)]
pub struct JsonFileStore {
    inner: Arc<JsonFileStoreInner>,
}

struct JsonFileStoreInner {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StorageEvent>,
}

impl JsonFileStore {
    /// Open a store at `path`, creating parent directories as needed.
    ///
    /// A missing file starts the store empty; it is created on first write.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let map = read_snapshot(&path)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        debug!(path = %path.display(), keys = map.len(), "opened storage file");
        Ok(Self {
            inner: Arc::new(JsonFileStoreInner {
                path,
                map: Mutex::new(map),
                changes,
            }),
        })
    }

    fn notify(&self, key: &str, value: Option<String>) {
        let _ = self.inner.changes.send(StorageEvent {
            key: key.to_string(),
            value,
        });
    }

    fn persist(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.inner.path.with_extension("tmp");
        let body = serde_json::to_string_pretty(map).map_err(|source| StorageError::Corrupt {
            key: String::new(),
            source,
        })?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.inner.path)?;
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> Result<HashMap<String, String>, StorageError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let body = fs::read_to_string(path)?;
    serde_json::from_str(&body).map_err(|source| StorageError::Corrupt {
        key: path.display().to_string(),
        source,
    })
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.inner.map.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut map = self.inner.map.lock().unwrap_or_else(|e| e.into_inner());
            map.insert(key.to_string(), value.to_string());
            self.persist(&map)?;
        }
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = {
            let mut map = self.inner.map.lock().unwrap_or_else(|e| e.into_inner());
            let removed = map.remove(key);
            if removed.is_some() {
                self.persist(&map)?;
            }
            removed
        };
        if removed.is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let map = self.inner.map.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.changes.subscribe()
    }

    /// Reconcile the in-memory map with the file and emit change events for
    /// every key that differs. Called when a view regains foreground focus.
    fn refresh(&self) -> Result<(), StorageError> {
        let fresh = read_snapshot(&self.inner.path)?;
        let mut events = Vec::new();
        {
            let mut map = self.inner.map.lock().unwrap_or_else(|e| e.into_inner());
            for (key, value) in &fresh {
                if map.get(key) != Some(value) {
                    events.push(StorageEvent {
                        key: key.clone(),
                        value: Some(value.clone()),
                    });
                }
            }
            for key in map.keys() {
                if !fresh.contains_key(key) {
                    events.push(StorageEvent {
                        key: key.clone(),
                        value: None,
                    });
                }
            }
            *map = fresh;
        }
        for event in events {
            let _ = self.inner.changes.send(event);
        }
        Ok(())
    }
}
