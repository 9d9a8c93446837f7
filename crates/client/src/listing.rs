//! Shop-listing view-model.
//!
//! Wraps the shop catalog with the two behaviors page views need:
//!
//! - **Stale-response discard**: a listing fetch is tagged with a
//!   generation token when it starts; by the time it resolves, a newer
//!   fetch (same page re-mounted, or the current market changed) may have
//!   superseded it. A superseded response is dropped on the floor - it
//!   never overwrites state for the market currently displayed, and it is
//!   not an error.
//! - **Frequent-shops ranking**: the "자주 가는 가게" view filters the
//!   full listing down to the user's favorited shops, orders by favorite
//!   count, and keeps the top few.

use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use sijang_core::{MarketId, ShopId};
use tracing::{debug, instrument};

use crate::api::{ApiError, ShopCatalog, ShopSummary};

/// Default row count for the frequent-shops grid.
pub const DEFAULT_FREQUENT_LIMIT: usize = 6;

/// The listing a view is currently showing.
#[derive(Debug, Clone)]
pub struct Listing {
    pub market_id: MarketId,
    pub shops: Vec<ShopSummary>,
}

/// Listing state for one mounted page view.
pub struct ShopListing<C> {
    catalog: C,
    generation: AtomicU64,
    current: RwLock<Option<Listing>>,
}

impl<C: ShopCatalog> ShopListing<C> {
    /// Create an empty listing over `catalog`.
    pub fn new(catalog: C) -> Self {
        Self {
            catalog,
            generation: AtomicU64::new(0),
            current: RwLock::new(None),
        }
    }

    /// Fetch the shops of `market_id` and make them current.
    ///
    /// Returns `Ok(None)` when the response arrived stale - a newer
    /// `refresh` started while this one was in flight - in which case the
    /// current listing is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog fetch fails; the current listing
    /// is left untouched.
    #[instrument(skip(self))]
    pub async fn refresh(&self, market_id: MarketId) -> Result<Option<Listing>, ApiError> {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shops = self.catalog.list_shops(market_id).await?;

        if self.generation.load(Ordering::SeqCst) != token {
            debug!("discarding stale shop listing response");
            return Ok(None);
        }

        let listing = Listing { market_id, shops };
        {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            *current = Some(listing.clone());
        }
        Ok(Some(listing))
    }

    /// The listing currently displayed, if any.
    #[must_use]
    pub fn current(&self) -> Option<Listing> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Invalidate the current listing (view unmounted or market cleared).
    /// In-flight responses become stale.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = None;
    }

    /// The user's favorited shops in `market_id`, most-favorited first,
    /// at most `limit` rows.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog fetch fails.
    #[instrument(skip(self, favorited))]
    pub async fn frequent(
        &self,
        market_id: MarketId,
        favorited: &[ShopId],
        limit: usize,
    ) -> Result<Vec<ShopSummary>, ApiError> {
        let shops = self.catalog.list_shops(market_id).await?;
        Ok(rank_frequent(shops, favorited, limit))
    }
}

/// Filter `shops` down to the favorited set, sort by favorite count
/// descending, and keep the first `limit`.
#[must_use]
pub fn rank_frequent(
    shops: Vec<ShopSummary>,
    favorited: &[ShopId],
    limit: usize,
) -> Vec<ShopSummary> {
    let favorited: HashSet<ShopId> = favorited.iter().copied().collect();
    let mut ranked: Vec<ShopSummary> = shops
        .into_iter()
        .filter(|shop| favorited.contains(&shop.shop_id))
        .collect();
    ranked.sort_by(|a, b| b.favorite_count.cmp(&a.favorite_count));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn shop(id: i64, favorite_count: i64) -> ShopSummary {
        ShopSummary {
            shop_id: ShopId::new(id),
            name: format!("가게 {id}"),
            favorite_count,
            image_urls: Vec::new(),
            category: None,
            description: None,
        }
    }

    /// Catalog fake that can hold one market's response until released.
    #[derive(Default)]
    struct GatedCatalog {
        gate_market: Option<MarketId>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ShopCatalog for Arc<GatedCatalog> {
        async fn list_shops(&self, market_id: MarketId) -> Result<Vec<ShopSummary>, ApiError> {
            if self.gate_market == Some(market_id) {
                self.release.notified().await;
            }
            Ok(vec![shop(market_id.as_i64() * 10, 1)])
        }
    }

    #[test]
    fn test_rank_frequent_filters_sorts_truncates() {
        let shops = vec![shop(1, 5), shop(2, 12), shop(3, 1), shop(4, 99)];
        let favorited = vec![ShopId::new(1), ShopId::new(2), ShopId::new(3)];

        let ranked = rank_frequent(shops, &favorited, 2);

        let ids: Vec<ShopId> = ranked.iter().map(|s| s.shop_id).collect();
        // Shop 4 is popular but not favorited; shop 3 falls off the limit.
        assert_eq!(ids, vec![ShopId::new(2), ShopId::new(1)]);
    }

    #[test]
    fn test_rank_frequent_empty_favorites() {
        let ranked = rank_frequent(vec![shop(1, 5)], &[], DEFAULT_FREQUENT_LIMIT);
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_makes_listing_current() {
        let listing = ShopListing::new(Arc::new(GatedCatalog::default()));
        let result = listing
            .refresh(MarketId::new(1))
            .await
            .expect("fetches")
            .expect("current");
        assert_eq!(result.market_id, MarketId::new(1));
        assert_eq!(
            listing.current().expect("present").market_id,
            MarketId::new(1)
        );
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let release = Arc::new(Notify::new());
        let catalog = Arc::new(GatedCatalog {
            gate_market: Some(MarketId::new(1)),
            release: Arc::clone(&release),
        });
        let listing = Arc::new(ShopListing::new(catalog));

        // Slow fetch for market 1...
        let slow = tokio::spawn({
            let listing = Arc::clone(&listing);
            async move { listing.refresh(MarketId::new(1)).await }
        });
        tokio::task::yield_now().await;

        // ...superseded by a fetch for market 2 that completes first.
        listing
            .refresh(MarketId::new(2))
            .await
            .expect("fetches")
            .expect("current");

        release.notify_one();
        let stale = slow.await.expect("joins").expect("fetches");
        assert!(stale.is_none());

        // Market 2 stayed on screen.
        assert_eq!(
            listing.current().expect("present").market_id,
            MarketId::new(2)
        );
    }

    #[tokio::test]
    async fn test_reset_invalidates_in_flight_fetch() {
        let release = Arc::new(Notify::new());
        let catalog = Arc::new(GatedCatalog {
            gate_market: Some(MarketId::new(1)),
            release: Arc::clone(&release),
        });
        let listing = Arc::new(ShopListing::new(catalog));

        let slow = tokio::spawn({
            let listing = Arc::clone(&listing);
            async move { listing.refresh(MarketId::new(1)).await }
        });
        tokio::task::yield_now().await;

        listing.reset();
        release.notify_one();

        let stale = slow.await.expect("joins").expect("fetches");
        assert!(stale.is_none());
        assert!(listing.current().is_none());
    }
}
