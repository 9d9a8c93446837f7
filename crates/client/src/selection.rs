//! Durable market selection state.
//!
//! Two pieces share this store:
//!
//! - the single-slot **current market** driving every shop/product query,
//!   split across one key per field so partial updates stay single-key
//!   atomic writes;
//! - the bounded **saved markets** list the user curates from the map
//!   search, stored as one JSON array.
//!
//! Saving a newly discovered market is deliberately coupled to selecting
//! it: a successful save also registers the market with the backend (or
//! resolves its existing ID) and promotes it to the current selection.
//! Un-saving leaves the current selection untouched.

use serde::{Deserialize, Serialize};
use sijang_core::{Coordinates, MarketId};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::api::{ApiError, MarketCandidate, MarketDirectory, NewMarket};
use crate::events::{EventBus, StoreEvent};
use crate::storage::{SharedStorage, StorageError, get_json, set_json};

/// Storage keys for selection state.
pub mod keys {
    /// Current market display name. Presence of this key makes the
    /// selection "active".
    pub const CURRENT_NAME: &str = "market.current.name";
    /// Current market remote ID. Absent while the selection is partial.
    pub const CURRENT_ID: &str = "market.current.id";
    /// Current market latitude.
    pub const CURRENT_LAT: &str = "market.current.lat";
    /// Current market longitude.
    pub const CURRENT_LNG: &str = "market.current.lng";
    /// JSON array of saved markets, most recently added first.
    pub const SAVED: &str = "market.saved";
}

/// Maximum number of saved markets; the oldest beyond this is evicted.
pub const MAX_SAVED: usize = 10;

/// Errors from selection operations.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// Durable storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The market was saved locally, but backend registration/lookup
    /// failed. The saved entry is kept; the user should be told the
    /// market could not be registered yet.
    #[error("market registration failed: {source}")]
    Register {
        /// The local outcome that already took effect, so the UI can still
        /// flash it before surfacing the registration error.
        outcome: SaveOutcome,
        #[source]
        source: ApiError,
    },
}

/// The active market context.
///
/// A selection with a name but no ID is *partial*: views must resolve the
/// ID before issuing shop-listing requests.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSelection {
    pub name: String,
    pub id: Option<MarketId>,
    pub coords: Option<Coordinates>,
}

impl MarketSelection {
    /// A selection carrying only a display name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            coords: None,
        }
    }

    /// True when the remote ID still needs resolving.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.id.is_none()
    }
}

/// One entry of the saved-markets list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMarket {
    /// Stable key: the map provider's place ID when known, otherwise the
    /// coordinate-derived `"lat,lng"` key. De-duplication uses this.
    pub key: String,
    /// Backend market ID, filled in once registration resolves.
    #[serde(default)]
    pub market_id: Option<MarketId>,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl SavedMarket {
    fn from_candidate(candidate: &MarketCandidate) -> Self {
        Self {
            key: candidate.key(),
            market_id: None,
            name: candidate.name.clone(),
            address: candidate.address.clone(),
            lat: candidate.coords.lat,
            lng: candidate.coords.lng,
        }
    }
}

/// Transient outcome of a save toggle, consumed by the UI flash signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The market was added to the saved list (and selected, once its
    /// remote ID resolved).
    Added,
    /// The market was removed from the saved list.
    Removed,
}

/// Store for the current market slot and the saved-markets list.
pub struct SelectionStore<D> {
    storage: SharedStorage,
    directory: D,
    events: EventBus,
}

impl<D: MarketDirectory> SelectionStore<D> {
    /// Create a store over `storage`, resolving market IDs through
    /// `directory`.
    pub fn new(storage: SharedStorage, directory: D, events: EventBus) -> Self {
        Self {
            storage,
            directory,
            events,
        }
    }

    // =========================================================================
    // Current selection
    // =========================================================================

    /// Read the current selection. `Ok(None)` when no market is selected.
    ///
    /// # Errors
    ///
    /// Returns an error when storage reads fail.
    pub fn current(&self) -> Result<Option<MarketSelection>, StorageError> {
        let Some(name) = self.storage.get(keys::CURRENT_NAME)? else {
            return Ok(None);
        };
        let id = self
            .storage
            .get(keys::CURRENT_ID)?
            .and_then(|raw| raw.parse().ok());
        let lat = self
            .storage
            .get(keys::CURRENT_LAT)?
            .and_then(|raw| raw.parse::<f64>().ok());
        let lng = self
            .storage
            .get(keys::CURRENT_LNG)?
            .and_then(|raw| raw.parse::<f64>().ok());
        let coords = match (lat, lng) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        };
        Ok(Some(MarketSelection { name, id, coords }))
    }

    /// Overwrite the current-selection slot.
    ///
    /// `name` is always written; `id` and coordinates are written only when
    /// present, leaving previously stored values for absent fields intact.
    ///
    /// # Errors
    ///
    /// Returns an error when a storage write fails.
    pub fn set_current(&self, selection: &MarketSelection) -> Result<(), StorageError> {
        self.storage.set(keys::CURRENT_NAME, &selection.name)?;
        if let Some(id) = selection.id {
            self.storage.set(keys::CURRENT_ID, &id.to_string())?;
        }
        if let Some(coords) = selection.coords {
            self.storage.set(keys::CURRENT_LAT, &coords.lat.to_string())?;
            self.storage.set(keys::CURRENT_LNG, &coords.lng.to_string())?;
        }
        self.events.publish(StoreEvent::SelectionChanged);
        Ok(())
    }

    /// Pick a market from the saved list as the current selection.
    ///
    /// # Errors
    ///
    /// Returns an error when a storage write fails.
    pub fn choose(&self, saved: &SavedMarket) -> Result<(), StorageError> {
        self.set_current(&MarketSelection {
            name: saved.name.clone(),
            id: saved.market_id,
            coords: Some(Coordinates::new(saved.lat, saved.lng)),
        })
    }

    /// Clear every field of the current-selection slot. The saved list is
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error when a storage write fails.
    pub fn clear_current(&self) -> Result<(), StorageError> {
        self.storage.remove(keys::CURRENT_NAME)?;
        self.storage.remove(keys::CURRENT_ID)?;
        self.storage.remove(keys::CURRENT_LAT)?;
        self.storage.remove(keys::CURRENT_LNG)?;
        self.events.publish(StoreEvent::SelectionChanged);
        Ok(())
    }

    // =========================================================================
    // Saved markets
    // =========================================================================

    /// The saved markets, most recently added first.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored list is unreadable.
    pub fn list_saved(&self) -> Result<Vec<SavedMarket>, StorageError> {
        Ok(get_json(self.storage.as_ref(), keys::SAVED)?.unwrap_or_default())
    }

    /// Toggle a discovered market's membership in the saved list.
    ///
    /// Removing only mutates the list. Adding inserts at the front,
    /// truncates to [`MAX_SAVED`], then registers the market with the
    /// backend and - once the remote ID resolves - records the ID on the
    /// saved entry and promotes the market to the current selection.
    ///
    /// # Errors
    ///
    /// [`SelectionError::Register`] means the local save succeeded but the
    /// backend round trip failed; the entry stays saved, and the error
    /// carries the [`SaveOutcome`] that already took effect.
    #[instrument(skip(self, candidate), fields(name = %candidate.name))]
    pub async fn toggle_saved(
        &self,
        candidate: &MarketCandidate,
    ) -> Result<SaveOutcome, SelectionError> {
        let key = candidate.key();
        let mut saved = self.list_saved()?;

        if saved.iter().any(|entry| entry.key == key) {
            saved.retain(|entry| entry.key != key);
            set_json(self.storage.as_ref(), keys::SAVED, &saved)?;
            self.events.publish(StoreEvent::SavedMarketsChanged);
            // Un-saving does not clear the current selection.
            return Ok(SaveOutcome::Removed);
        }

        saved.insert(0, SavedMarket::from_candidate(candidate));
        saved.truncate(MAX_SAVED);
        set_json(self.storage.as_ref(), keys::SAVED, &saved)?;
        self.events.publish(StoreEvent::SavedMarketsChanged);

        // Save implies select: resolve the backend ID and promote this
        // market to the current selection.
        let market = NewMarket::from_place(
            candidate.name.clone(),
            candidate.address.clone().unwrap_or_default(),
            candidate.coords.lat,
            candidate.coords.lng,
        );
        let market_id = match self.directory.ensure(&market).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "market registration failed; keeping local save");
                return Err(SelectionError::Register {
                    outcome: SaveOutcome::Added,
                    source: e,
                });
            }
        };

        self.record_market_id(&key, market_id)?;
        self.set_current(&MarketSelection {
            name: candidate.name.clone(),
            id: Some(market_id),
            coords: Some(candidate.coords),
        })?;
        Ok(SaveOutcome::Added)
    }

    /// Attach a resolved backend ID to the saved entry with `key`.
    fn record_market_id(&self, key: &str, market_id: MarketId) -> Result<(), StorageError> {
        let mut saved = self.list_saved()?;
        let mut changed = false;
        for entry in &mut saved {
            if entry.key == key && entry.market_id != Some(market_id) {
                entry.market_id = Some(market_id);
                changed = true;
            }
        }
        if changed {
            set_json(self.storage.as_ref(), keys::SAVED, &saved)?;
            self.events.publish(StoreEvent::SavedMarketsChanged);
        }
        Ok(())
    }

    // =========================================================================
    // Cross-context sync
    // =========================================================================

    /// Re-read the storage backend and republish both selection events.
    ///
    /// Call when a view regains foreground focus; covers storage backends
    /// without native cross-context change events.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend refresh fails.
    pub fn resync(&self) -> Result<(), StorageError> {
        self.storage.refresh()?;
        self.events.publish(StoreEvent::SelectionChanged);
        self.events.publish(StoreEvent::SavedMarketsChanged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::storage::MemoryStore;

    /// Directory fake: resolves every market to a fixed ID, or fails.
    struct FakeDirectory {
        result: Result<MarketId, ()>,
        calls: AtomicUsize,
    }

    impl FakeDirectory {
        fn ok(id: i64) -> Self {
            Self {
                result: Ok(MarketId::new(id)),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                result: Err(()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketDirectory for Arc<FakeDirectory> {
        async fn ensure(&self, market: &NewMarket) -> Result<MarketId, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map_err(|()| ApiError::IdUnresolved(market.name.clone()))
        }
    }

    fn candidate(key: &str, name: &str) -> MarketCandidate {
        MarketCandidate {
            place_id: Some(key.to_string()),
            name: name.to_string(),
            address: Some("천안시 동남구".to_string()),
            coords: Coordinates::new(36.8, 127.1),
        }
    }

    fn store_with(directory: Arc<FakeDirectory>) -> SelectionStore<Arc<FakeDirectory>> {
        SelectionStore::new(Arc::new(MemoryStore::new()), directory, EventBus::new())
    }

    #[test]
    fn test_current_empty_by_default() {
        let store = store_with(Arc::new(FakeDirectory::ok(1)));
        assert_eq!(store.current().expect("reads"), None);
    }

    #[test]
    fn test_set_current_partial_update_keeps_stored_id() {
        let store = store_with(Arc::new(FakeDirectory::ok(1)));
        store
            .set_current(&MarketSelection {
                name: "중앙시장".to_string(),
                id: Some(MarketId::new(7)),
                coords: Some(Coordinates::new(36.8, 127.1)),
            })
            .expect("writes");

        // New selection without an ID: name is overwritten, ID survives.
        store
            .set_current(&MarketSelection::named("중앙시장 (야시장)"))
            .expect("writes");

        let current = store.current().expect("reads").expect("present");
        assert_eq!(current.name, "중앙시장 (야시장)");
        assert_eq!(current.id, Some(MarketId::new(7)));
        assert!(!current.is_partial());
    }

    #[test]
    fn test_clear_current_removes_every_field() {
        let store = store_with(Arc::new(FakeDirectory::ok(1)));
        store
            .set_current(&MarketSelection {
                name: "중앙시장".to_string(),
                id: Some(MarketId::new(7)),
                coords: Some(Coordinates::new(36.8, 127.1)),
            })
            .expect("writes");

        store.clear_current().expect("clears");
        assert_eq!(store.current().expect("reads"), None);

        // A later name-only selection must not resurrect the old ID.
        store
            .set_current(&MarketSelection::named("새시장"))
            .expect("writes");
        let current = store.current().expect("reads").expect("present");
        assert!(current.is_partial());
    }

    #[tokio::test]
    async fn test_toggle_saved_is_an_involution_on_membership() {
        let store = store_with(Arc::new(FakeDirectory::ok(1)));

        let a = candidate("p-a", "A시장");
        let b = candidate("p-b", "B시장");

        store.toggle_saved(&a).await.expect("adds");
        store.toggle_saved(&b).await.expect("adds");
        store.toggle_saved(&a).await.expect("removes");

        let saved = store.list_saved().expect("reads");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].key, "p-b");
    }

    #[tokio::test]
    async fn test_saved_list_capped_at_ten_most_recent_first() {
        let store = store_with(Arc::new(FakeDirectory::ok(1)));

        for i in 0..12 {
            let c = candidate(&format!("p-{i}"), &format!("시장 {i}"));
            store.toggle_saved(&c).await.expect("adds");
        }

        let saved = store.list_saved().expect("reads");
        assert_eq!(saved.len(), MAX_SAVED);
        assert_eq!(saved[0].key, "p-11");
        // p-0 and p-1 were evicted.
        assert!(!saved.iter().any(|e| e.key == "p-0" || e.key == "p-1"));
    }

    #[tokio::test]
    async fn test_save_implies_select() {
        let directory = Arc::new(FakeDirectory::ok(42));
        let store = store_with(Arc::clone(&directory));

        let outcome = store
            .toggle_saved(&candidate("p-a", "A시장"))
            .await
            .expect("adds");
        assert_eq!(outcome, SaveOutcome::Added);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);

        let current = store.current().expect("reads").expect("present");
        assert_eq!(current.name, "A시장");
        assert_eq!(current.id, Some(MarketId::new(42)));

        let saved = store.list_saved().expect("reads");
        assert_eq!(saved[0].market_id, Some(MarketId::new(42)));
    }

    #[tokio::test]
    async fn test_unsave_keeps_current_selection() {
        let store = store_with(Arc::new(FakeDirectory::ok(42)));
        let c = candidate("p-a", "A시장");

        store.toggle_saved(&c).await.expect("adds");
        let outcome = store.toggle_saved(&c).await.expect("removes");
        assert_eq!(outcome, SaveOutcome::Removed);

        // Selection survives the un-save.
        let current = store.current().expect("reads").expect("present");
        assert_eq!(current.id, Some(MarketId::new(42)));
    }

    #[tokio::test]
    async fn test_registration_failure_keeps_local_save() {
        let store = store_with(Arc::new(FakeDirectory::failing()));

        let result = store.toggle_saved(&candidate("p-a", "A시장")).await;
        // The error still reports the local save, so the UI can flash it.
        assert!(matches!(
            result,
            Err(SelectionError::Register {
                outcome: SaveOutcome::Added,
                ..
            })
        ));

        // The entry stays saved; the selection was never promoted.
        let saved = store.list_saved().expect("reads");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].market_id, None);
        assert_eq!(store.current().expect("reads"), None);
    }

    #[tokio::test]
    async fn test_choose_from_saved_list() {
        let directory = Arc::new(FakeDirectory::ok(42));
        let store = store_with(directory);
        store.toggle_saved(&candidate("p-a", "A시장")).await.expect("adds");
        store.clear_current().expect("clears");

        let saved = store.list_saved().expect("reads");
        store.choose(&saved[0]).expect("chooses");

        let current = store.current().expect("reads").expect("present");
        assert_eq!(current.name, "A시장");
        assert_eq!(current.id, Some(MarketId::new(42)));
    }

    #[tokio::test]
    async fn test_cross_context_observation() {
        let shared = MemoryStore::new();
        let directory = Arc::new(FakeDirectory::ok(1));

        let tab_a: SelectionStore<Arc<FakeDirectory>> = SelectionStore::new(
            Arc::new(shared.clone()),
            Arc::clone(&directory),
            EventBus::new(),
        );
        let tab_b: SelectionStore<Arc<FakeDirectory>> =
            SelectionStore::new(Arc::new(shared), directory, EventBus::new());

        tab_a
            .set_current(&MarketSelection::named("중앙시장"))
            .expect("writes");

        let seen = tab_b.current().expect("reads").expect("present");
        assert_eq!(seen.name, "중앙시장");
    }
}
