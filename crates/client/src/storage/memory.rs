//! In-memory storage backend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use super::{CHANGE_CHANNEL_CAPACITY, KeyValueStore, StorageError, StorageEvent};

/// Process-local key-value store.
///
/// Clones share the same underlying map and notification channel, so two
/// clones behave like two contexts (tabs) over the same storage - mutations
/// through one clone are observed by subscribers of the other.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

struct MemoryStoreInner {
    map: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MemoryStoreInner {
                map: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    fn notify(&self, key: &str, value: Option<String>) {
        // No subscribers is fine; the send result is irrelevant.
        let _ = self.inner.changes.send(StorageEvent {
            key: key.to_string(),
            value,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.inner.map.read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut map = self.inner.map.write().unwrap_or_else(|e| e.into_inner());
            map.insert(key.to_string(), value.to_string());
        }
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = {
            let mut map = self.inner.map.write().unwrap_or_else(|e| e.into_inner());
            map.remove(key)
        };
        if removed.is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let map = self.inner.map.read().unwrap_or_else(|e| e.into_inner());
        Ok(map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.changes.subscribe()
    }
}
