//! Durable per-shop favorite flags.
//!
//! A favorite is a boolean-presence entry keyed by `(market, shop)`:
//! the key existing means "favorited", removal means "not favorited" -
//! no explicit false is ever stored.
//!
//! Toggling is optimistic. The durable flag flips and a change event goes
//! out *before* the remote confirmation; a failed confirmation rolls the
//! flag back and publishes a second event so views can revert optimistic
//! counters. Concurrent toggles of the same flag are serialized through a
//! per-key async mutex - the second toggle waits for the first to resolve,
//! so local and remote state cannot diverge through interleaving.

mod flag;

pub use flag::FlagState;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sijang_core::{MarketId, ShopId};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::api::{ApiError, FavoriteSync};
use crate::events::{EventBus, StoreEvent};
use crate::storage::{SharedStorage, StorageError};

/// Storage key layout for favorite flags.
pub mod keys {
    use sijang_core::{MarketId, ShopId};

    /// Prefix shared by every favorite flag.
    pub const PREFIX: &str = "fav.";

    /// Key for one `(market, shop)` flag.
    #[must_use]
    pub fn flag(market_id: MarketId, shop_id: ShopId) -> String {
        format!("{PREFIX}{market_id}.{shop_id}")
    }

    /// Prefix covering every flag of one market.
    #[must_use]
    pub fn market_prefix(market_id: MarketId) -> String {
        format!("{PREFIX}{market_id}.")
    }
}

/// Stored value of a present flag.
const FLAG_VALUE: &str = "1";

/// Errors from favorite operations.
#[derive(Debug, Error)]
pub enum FavoriteError {
    /// Durable storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The remote confirmation failed; the local flag was rolled back to
    /// its pre-toggle value. Callers should revert optimistic counters
    /// and surface an inline error.
    #[error("favorite sync failed: {0}")]
    Sync(#[source] ApiError),
}

/// Store for per-shop favorite flags.
pub struct FavoritesStore<S> {
    storage: SharedStorage,
    sync: S,
    events: EventBus,
    /// One async mutex per flag, created lazily and dropped once the last
    /// toggle on it settles. Serializes toggles so a second toggle waits
    /// for the first's remote resolution.
    locks: Mutex<HashMap<(MarketId, ShopId), Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: FavoriteSync> FavoritesStore<S> {
    /// Create a store over `storage`, confirming toggles through `sync`.
    pub fn new(storage: SharedStorage, sync: S, events: EventBus) -> Self {
        Self {
            storage,
            sync,
            events,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the shop is currently favorited (optimistic value while a
    /// toggle is in flight).
    ///
    /// # Errors
    ///
    /// Returns an error when the storage read fails.
    pub fn is_favorited(&self, market_id: MarketId, shop_id: ShopId) -> Result<bool, StorageError> {
        Ok(self
            .storage
            .get(&keys::flag(market_id, shop_id))?
            .is_some())
    }

    /// Every favorited shop of a market.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage scan fails.
    pub fn list_favorited_shop_ids(
        &self,
        market_id: MarketId,
    ) -> Result<Vec<ShopId>, StorageError> {
        let prefix = keys::market_prefix(market_id);
        let mut ids: Vec<ShopId> = self
            .storage
            .keys_with_prefix(&prefix)?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|suffix| suffix.parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Toggle a shop's favorite flag, returning the new (confirmed) state.
    ///
    /// The flag flips durably and [`StoreEvent::FavoriteChanged`] goes out
    /// before the remote call. On remote failure the flag rolls back, a
    /// second event goes out, and [`FavoriteError::Sync`] is returned.
    ///
    /// # Errors
    ///
    /// [`FavoriteError::Sync`] on confirmation failure (flag rolled back);
    /// [`FavoriteError::Storage`] when the durable flip itself fails.
    #[instrument(skip(self))]
    pub async fn toggle(
        &self,
        market_id: MarketId,
        shop_id: ShopId,
    ) -> Result<bool, FavoriteError> {
        let lock = self.lock_for(market_id, shop_id);
        let result = {
            let _guard = lock.lock().await;
            self.toggle_locked(market_id, shop_id).await
        };
        self.release(market_id, shop_id, &lock);
        result
    }

    async fn toggle_locked(
        &self,
        market_id: MarketId,
        shop_id: ShopId,
    ) -> Result<bool, FavoriteError> {
        let key = keys::flag(market_id, shop_id);
        let state = FlagState::from_stored(self.storage.get(&key)?.is_some());
        // Serialized by the per-key lock, so a toggle always starts from a
        // settled state.
        let Some(pending) = state.begin_toggle() else {
            return Ok(state.shows_favorited());
        };

        // Optimistic durable flip.
        let optimistic = pending.shows_favorited();
        self.apply(&key, optimistic)?;
        self.events.publish(StoreEvent::FavoriteChanged {
            market_id,
            shop_id,
            favorited: optimistic,
        });

        // Remote confirmation.
        let result = if optimistic {
            self.sync.create_favorite(market_id, shop_id).await
        } else {
            self.sync.delete_favorite(market_id, shop_id).await
        };

        match result {
            Ok(()) => Ok(pending.resolve(true).shows_favorited()),
            Err(e) => {
                let rolled_back = pending.resolve(false).shows_favorited();
                warn!(error = %e, "favorite confirmation failed, rolling back");
                self.apply(&key, rolled_back)?;
                self.events.publish(StoreEvent::FavoriteChanged {
                    market_id,
                    shop_id,
                    favorited: rolled_back,
                });
                Err(FavoriteError::Sync(e))
            }
        }
    }

    fn apply(&self, key: &str, favorited: bool) -> Result<(), StorageError> {
        if favorited {
            self.storage.set(key, FLAG_VALUE)
        } else {
            self.storage.remove(key)
        }
    }

    fn lock_for(&self, market_id: MarketId, shop_id: ShopId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry((market_id, shop_id))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Drop the map entry for a flag once no toggle holds or awaits it, so
    /// a long session does not accumulate dead mutexes.
    fn release(&self, market_id: MarketId, shop_id: ShopId, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Clones are only handed out under this map mutex, so a count of
        // exactly two (map entry + our caller) means nobody is waiting.
        if Arc::strong_count(lock) == 2 {
            locks.remove(&(market_id, shop_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::storage::MemoryStore;

    /// Sync fake recording call order; optionally failing, optionally slow.
    #[derive(Default)]
    struct FakeSync {
        fail: AtomicBool,
        delay: Option<Duration>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeSync {
        fn failing() -> Self {
            let fake = Self::default();
            fake.fail.store(true, Ordering::SeqCst);
            fake
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        async fn record(&self, call: &'static str) -> Result<(), ApiError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(call);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl FavoriteSync for Arc<FakeSync> {
        async fn create_favorite(
            &self,
            _market_id: MarketId,
            _shop_id: ShopId,
        ) -> Result<(), ApiError> {
            self.record("create").await
        }

        async fn delete_favorite(
            &self,
            _market_id: MarketId,
            _shop_id: ShopId,
        ) -> Result<(), ApiError> {
            self.record("delete").await
        }
    }

    fn store_with(sync: Arc<FakeSync>) -> FavoritesStore<Arc<FakeSync>> {
        FavoritesStore::new(Arc::new(MemoryStore::new()), sync, EventBus::new())
    }

    const MARKET: MarketId = MarketId::new(7);
    const SHOP: ShopId = ShopId::new(42);

    #[tokio::test]
    async fn test_toggle_on_then_off() {
        let sync = Arc::new(FakeSync::default());
        let store = store_with(Arc::clone(&sync));

        assert!(!store.is_favorited(MARKET, SHOP).expect("reads"));

        let now = store.toggle(MARKET, SHOP).await.expect("toggles");
        assert!(now);
        assert!(store.is_favorited(MARKET, SHOP).expect("reads"));

        let now = store.toggle(MARKET, SHOP).await.expect("toggles");
        assert!(!now);
        assert!(!store.is_favorited(MARKET, SHOP).expect("reads"));

        assert_eq!(sync.calls(), vec!["create", "delete"]);
    }

    #[tokio::test]
    async fn test_failed_confirmation_rolls_back() {
        let store = store_with(Arc::new(FakeSync::failing()));

        let result = store.toggle(MARKET, SHOP).await;
        assert!(matches!(result, Err(FavoriteError::Sync(_))));
        assert!(!store.is_favorited(MARKET, SHOP).expect("reads"));
    }

    #[tokio::test]
    async fn test_optimistic_event_precedes_rollback_event() {
        let bus = EventBus::new();
        let store = FavoritesStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FakeSync::failing()),
            bus.clone(),
        );
        let mut rx = bus.subscribe();

        let _ = store.toggle(MARKET, SHOP).await;

        let first = rx.recv().await.expect("receives");
        let second = rx.recv().await.expect("receives");
        assert_eq!(
            first,
            StoreEvent::FavoriteChanged {
                market_id: MARKET,
                shop_id: SHOP,
                favorited: true,
            }
        );
        assert_eq!(
            second,
            StoreEvent::FavoriteChanged {
                market_id: MARKET,
                shop_id: SHOP,
                favorited: false,
            }
        );
    }

    #[tokio::test]
    async fn test_list_favorited_is_scoped_to_market() {
        let sync = Arc::new(FakeSync::default());
        let store = store_with(sync);

        store.toggle(MARKET, ShopId::new(1)).await.expect("toggles");
        store.toggle(MARKET, ShopId::new(3)).await.expect("toggles");
        store
            .toggle(MarketId::new(8), ShopId::new(2))
            .await
            .expect("toggles");

        let ids = store.list_favorited_shop_ids(MARKET).expect("lists");
        assert_eq!(ids, vec![ShopId::new(1), ShopId::new(3)]);
    }

    #[tokio::test]
    async fn test_concurrent_toggles_are_serialized() {
        let sync = Arc::new(FakeSync::slow(Duration::from_millis(20)));
        let store = Arc::new(store_with(Arc::clone(&sync)));

        let a = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.toggle(MARKET, SHOP).await }
        });
        let b = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.toggle(MARKET, SHOP).await }
        });

        a.await.expect("joins").expect("toggles");
        b.await.expect("joins").expect("toggles");

        // Second toggle waited for the first, so the remote saw a clean
        // create-then-delete and the local flag ends where it started.
        assert_eq!(sync.calls(), vec!["create", "delete"]);
        assert!(!store.is_favorited(MARKET, SHOP).expect("reads"));
    }

    #[tokio::test]
    async fn test_settled_toggles_leave_no_lock_entries() {
        let store = store_with(Arc::new(FakeSync::default()));

        store.toggle(MARKET, SHOP).await.expect("toggles");
        store.toggle(MARKET, ShopId::new(43)).await.expect("toggles");
        store.toggle(MARKET, SHOP).await.expect("toggles");

        let locks = store.locks.lock().unwrap_or_else(|e| e.into_inner());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_contended_lock_entry_survives_until_last_toggle() {
        let sync = Arc::new(FakeSync::slow(Duration::from_millis(20)));
        let store = Arc::new(store_with(Arc::clone(&sync)));

        let a = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.toggle(MARKET, SHOP).await }
        });
        let b = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.toggle(MARKET, SHOP).await }
        });

        a.await.expect("joins").expect("toggles");
        b.await.expect("joins").expect("toggles");

        // Both settled; the shared entry is gone.
        let locks = store.locks.lock().unwrap_or_else(|e| e.into_inner());
        assert!(locks.is_empty());
    }
}
