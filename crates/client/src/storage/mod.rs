//! Durable client-side key-value storage.
//!
//! The browser's `localStorage` equivalent: a flat string-keyed store shared
//! by every open context of the app. Stores are written through a trait so
//! tests and embedders can substitute their own backend.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] - process-local, used in tests and when no storage path
//!   is configured. Clones share the same map, which also makes it the
//!   vehicle for simulating multiple contexts (tabs) in tests.
//! - [`JsonFileStore`] - write-through JSON file with atomic replace, for
//!   embedders that need state to survive restarts.
//!
//! # Consistency
//!
//! Every mutation is a single-key atomic write. A read issued after a write
//! in the same context observes that write immediately. Cross-context
//! observation is eventually consistent: backends with no native change
//! events rely on [`KeyValueStore::refresh`] being called when a view
//! regains foreground focus.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur when touching durable storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed (file-backed stores only).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value failed to parse.
    #[error("corrupt value under key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A change to a single storage key.
///
/// `value` is `None` when the key was removed.
#[derive(Debug, Clone)]
pub struct StorageEvent {
    pub key: String,
    pub value: Option<String>,
}

/// Capacity of the change-notification channel.
///
/// Subscribers that lag simply miss events and are expected to re-read the
/// store, so a small buffer is enough.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Durable string-keyed storage shared across app contexts.
///
/// All methods are synchronous: the backing stores are either in-memory or
/// a small local file, matching the synchronous semantics of web storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a key. `Ok(None)` when the key was never set.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a key. A single atomic write; notifies subscribers.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. No-op when absent; notifies subscribers when present.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys starting with `prefix`, in unspecified order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Subscribe to change notifications for every key.
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;

    /// Re-read the backing medium and emit change events for keys mutated
    /// out-of-band (another process writing the same file).
    ///
    /// Backends with native change propagation may leave this a no-op.
    fn refresh(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Shared handle to a storage backend.
pub type SharedStorage = Arc<dyn KeyValueStore>;

/// Read a key and deserialize its JSON value.
///
/// # Errors
///
/// Returns `StorageError::Corrupt` when the stored text is not valid JSON
/// for `T`.
pub fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            }),
    }
}

/// Serialize a value to JSON and write it under `key`.
///
/// # Errors
///
/// Returns an error when the backend write fails. Serialization of the
/// in-memory value itself cannot fail for the types this crate stores.
pub fn set_json<T: serde::Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Corrupt {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_json_missing_key() {
        let store = MemoryStore::new();
        let value: Option<Vec<String>> = get_json(&store, "nope").expect("reads");
        assert!(value.is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let store = MemoryStore::new();
        set_json(&store, "list", &vec!["a".to_string(), "b".to_string()]).expect("writes");
        let back: Option<Vec<String>> = get_json(&store, "list").expect("reads");
        assert_eq!(back, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_corrupt_value_is_reported() {
        let store = MemoryStore::new();
        store.set("list", "not json").expect("writes");
        let result: Result<Option<Vec<String>>, _> = get_json(&store, "list");
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }
}
