//! Cross-context change propagation.
//!
//! Another app context (a second window, or an external writer touching the
//! storage file) changes durable keys without going through this process's
//! stores. The bridge maps raw [`StorageEvent`]s back onto the typed
//! [`StoreEvent`]s views already subscribe to, so a favorite toggled in one
//! window updates the heart icon in the other.

use sijang_core::{MarketId, ShopId};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::{EventBus, StoreEvent};
use crate::favorites::keys as favorite_keys;
use crate::mode::MODE_KEY;
use crate::selection::keys as selection_keys;
use crate::storage::{SharedStorage, StorageEvent};

/// Prefix shared by the current-selection keys.
const CURRENT_PREFIX: &str = "market.current.";

/// Map one raw storage change onto the store event it invalidates, or `None`
/// for keys no store owns.
#[must_use]
pub fn event_for_key(change: &StorageEvent) -> Option<StoreEvent> {
    if change.key.starts_with(CURRENT_PREFIX) {
        return Some(StoreEvent::SelectionChanged);
    }
    if change.key == selection_keys::SAVED {
        return Some(StoreEvent::SavedMarketsChanged);
    }
    if change.key == MODE_KEY {
        return Some(StoreEvent::ModeChanged);
    }
    if let Some((market_id, shop_id)) = parse_favorite_key(&change.key) {
        return Some(StoreEvent::FavoriteChanged {
            market_id,
            shop_id,
            favorited: change.value.is_some(),
        });
    }
    None
}

/// Parse `fav.{market}.{shop}` back into its IDs.
fn parse_favorite_key(key: &str) -> Option<(MarketId, ShopId)> {
    let suffix = key.strip_prefix(favorite_keys::PREFIX)?;
    let (market, shop) = suffix.split_once('.')?;
    Some((market.parse().ok()?, shop.parse().ok()?))
}

/// Forward storage changes onto `events` until the storage sender drops.
///
/// Spawned once per app context; the returned handle is usually detached.
pub fn spawn_storage_bridge(storage: &SharedStorage, events: EventBus) -> JoinHandle<()> {
    let mut changes = storage.subscribe();
    tokio::spawn(async move {
        while let Ok(change) = changes.recv().await {
            if let Some(event) = event_for_key(&change) {
                debug!(key = %change.key, "forwarding external storage change");
                events.publish(event);
            }
        }
    })
}
