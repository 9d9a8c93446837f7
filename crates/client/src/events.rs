//! Cross-store change notifications.
//!
//! Every store publishes an event after each successful mutation (for
//! optimistic mutations, after the local flip and again after a rollback).
//! View components subscribe and re-read whatever state they derive from.

use sijang_core::{MarketId, ShopId};
use tokio::sync::broadcast;

/// Capacity of the event channel.
///
/// Subscribers that lag miss events and are expected to re-read store
/// state, so a small buffer is enough.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A state change published by one of the stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A cart line was added, updated, or removed.
    CartChanged,
    /// The current-market slot changed (set, merged, or cleared).
    SelectionChanged,
    /// The saved-markets list changed (entry toggled or evicted).
    SavedMarketsChanged,
    /// A favorite flag flipped. Published optimistically before remote
    /// confirmation, and again if the flip is rolled back.
    FavoriteChanged {
        market_id: MarketId,
        shop_id: ShopId,
        favorited: bool,
    },
    /// The app mode (user/admin) flipped.
    ModeChanged,
}

/// Publish/subscribe channel shared by all stores.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a new bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Publishing never fails; with no subscribers the event is dropped.
    pub fn publish(&self, event: StoreEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(StoreEvent::CartChanged);

        assert_eq!(a.recv().await.expect("receives"), StoreEvent::CartChanged);
        assert_eq!(b.recv().await.expect("receives"), StoreEvent::CartChanged);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(StoreEvent::SelectionChanged);
    }
}
