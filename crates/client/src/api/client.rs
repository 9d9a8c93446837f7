//! Marketplace REST API client.
//!
//! Thin wrappers over the backend's market, shop, and favorite endpoints.
//! Shop listings are cached with `moka` (bounded, short TTL) since every
//! page re-requests them on mount.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::StatusCode;
use sijang_core::{MarketId, ShopId};
use tracing::{debug, instrument, warn};

use super::types::{CreatedMarket, MarketRecord, Page, ShopDetail, ShopSummary};
use super::{ApiError, FavoriteSync, MarketDirectory, NewMarket, ShopCatalog};
use crate::config::ApiConfig;

/// Page size for the initial market-lookup scan.
const LOOKUP_PAGE_SIZE: u32 = 200;
/// Widened page size for the one retry when the first scan misses.
const LOOKUP_PAGE_SIZE_WIDE: u32 = 500;
/// Shop-listing cache bounds.
const SHOP_CACHE_CAPACITY: u64 = 100;

/// Client for the marketplace backend.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: String,
    shops_cache: Cache<MarketId, Arc<Vec<ShopSummary>>>,
}

impl ApiClient {
    /// Create a new client from configuration.
    #[must_use]
    pub fn new(config: &ApiConfig) -> Self {
        let shops_cache = Cache::builder()
            .max_capacity(SHOP_CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Self {
            inner: Arc::new(ApiClientInner {
                http: reqwest::Client::new(),
                base_url: config.base_url.trim_end_matches('/').to_string(),
                shops_cache,
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    // =========================================================================
    // Markets
    // =========================================================================

    /// Ask the backend whether a market with this name or address exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the response is not a
    /// JSON boolean.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn check_market_exists(&self, name: &str, address: &str) -> Result<bool, ApiError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        let name = name.trim();
        let address = address.trim();
        if !name.is_empty() {
            query.push(("name", name));
        }
        if !address.is_empty() {
            query.push(("address", address));
        }

        let response = self
            .inner
            .http
            .get(self.url("/markets/check-exist"))
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<bool>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Scan the market listing for an exact (trimmed) name or address match.
    ///
    /// # Errors
    ///
    /// Returns an error when the listing request fails; a miss is `Ok(None)`.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn find_market_id(
        &self,
        name: &str,
        address: &str,
    ) -> Result<Option<MarketId>, ApiError> {
        self.find_market_id_paged(name, address, LOOKUP_PAGE_SIZE)
            .await
    }

    async fn find_market_id_paged(
        &self,
        name: &str,
        address: &str,
        size: u32,
    ) -> Result<Option<MarketId>, ApiError> {
        let response = self
            .inner
            .http
            .get(self.url("/markets"))
            .query(&[("page", "0"), ("size", &size.to_string())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let page: Page<MarketRecord> = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(find_in_listing(&page.content, name, address))
    }

    /// Register a market.
    ///
    /// A 409 conflict (someone registered it first) comes back as
    /// `ApiError::Status`; [`MarketDirectory::ensure`] resolves that race
    /// through a lookup retry.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails, the backend rejects the
    /// payload, or a created market comes back without an ID.
    #[instrument(skip(self, market), fields(name = %market.name))]
    pub async fn create_market(&self, market: &NewMarket) -> Result<MarketId, ApiError> {
        // The backend takes multipart form data, with array fields encoded
        // as JSON strings.
        let image_urls = serde_json::to_string(&market.image_urls)
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("name", market.name.clone())
            .text("address", market.address.clone())
            .text("latitude", market.latitude.to_string())
            .text("longitude", market.longitude.to_string())
            .text("description", market.description.clone())
            .text("imageUrls", image_urls);

        let response = self
            .inner
            .http
            .post(self.url("/markets"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let created: CreatedMarket = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        created
            .market_id
            .ok_or_else(|| ApiError::MissingId(market.name.clone()))
    }

    // =========================================================================
    // Shops
    // =========================================================================

    /// List every shop of a market. Responses are cached per market.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the body does not parse.
    #[instrument(skip(self))]
    pub async fn list_market_shops(
        &self,
        market_id: MarketId,
    ) -> Result<Arc<Vec<ShopSummary>>, ApiError> {
        if let Some(shops) = self.inner.shops_cache.get(&market_id).await {
            debug!("cache hit for shop listing");
            return Ok(shops);
        }

        let response = self
            .inner
            .http
            .get(self.url(&format!("/markets/{market_id}/shops")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let page: Page<ShopSummary> = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        let shops = Arc::new(page.content);
        self.inner
            .shops_cache
            .insert(market_id, Arc::clone(&shops))
            .await;
        Ok(shops)
    }

    /// Fetch one shop's detail.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for a 404, other errors as usual.
    #[instrument(skip(self))]
    pub async fn get_shop(
        &self,
        market_id: MarketId,
        shop_id: ShopId,
    ) -> Result<ShopDetail, ApiError> {
        let response = self
            .inner
            .http
            .get(self.url(&format!("/markets/{market_id}/shops/{shop_id}")))
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!(
                "shop {shop_id} in market {market_id}"
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    // =========================================================================
    // Favorites
    // =========================================================================

    async fn favorite_request(
        &self,
        method: reqwest::Method,
        market_id: MarketId,
        shop_id: ShopId,
    ) -> Result<(), ApiError> {
        let response = self
            .inner
            .http
            .request(
                method,
                self.url(&format!("/markets/{market_id}/shops/{shop_id}/favorites")),
            )
            .send()
            .await?;
        let status = response.status();

        // Repeating a create or delete against an already-matching remote
        // state is not an error.
        if status == StatusCode::CONFLICT || status == StatusCode::NOT_FOUND {
            debug!(status = status.as_u16(), "favorite state already matched");
            return Ok(());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "favorite request rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Exact-match scan used by market lookup: trimmed name equality OR trimmed
/// address equality, first hit wins.
fn find_in_listing(records: &[MarketRecord], name: &str, address: &str) -> Option<MarketId> {
    let name = name.trim();
    let address = address.trim();
    records
        .iter()
        .find(|record| {
            (!name.is_empty() && record.name.trim() == name)
                || (!address.is_empty()
                    && record.address.as_deref().map(str::trim) == Some(address))
        })
        .map(|record| record.market_id)
}

/// The three raw market endpoints the ensure orchestration composes.
///
/// Split out so the branchy resolution logic is testable with scripted
/// responses instead of a live backend.
#[async_trait]
trait MarketEndpoints: Send + Sync {
    async fn exists(&self, name: &str, address: &str) -> Result<bool, ApiError>;
    async fn find(&self, name: &str, address: &str, size: u32)
    -> Result<Option<MarketId>, ApiError>;
    async fn create(&self, market: &NewMarket) -> Result<MarketId, ApiError>;
}

#[async_trait]
impl MarketEndpoints for ApiClient {
    async fn exists(&self, name: &str, address: &str) -> Result<bool, ApiError> {
        self.check_market_exists(name, address).await
    }

    async fn find(
        &self,
        name: &str,
        address: &str,
        size: u32,
    ) -> Result<Option<MarketId>, ApiError> {
        self.find_market_id_paged(name, address, size).await
    }

    async fn create(&self, market: &NewMarket) -> Result<MarketId, ApiError> {
        self.create_market(market).await
    }
}

/// Resolve a market's remote ID, creating the market when it is new.
///
/// Exists → lookup (one widened retry before giving up); otherwise create,
/// with a 409 conflict on create (lost registration race) resolved through
/// a lookup retry.
async fn resolve_market_id<E: MarketEndpoints + ?Sized>(
    endpoints: &E,
    market: &NewMarket,
) -> Result<MarketId, ApiError> {
    if endpoints.exists(&market.name, &market.address).await? {
        if let Some(id) = endpoints
            .find(&market.name, &market.address, LOOKUP_PAGE_SIZE)
            .await?
        {
            return Ok(id);
        }
        // The first page may have missed it; widen once before giving up.
        if let Some(id) = endpoints
            .find(&market.name, &market.address, LOOKUP_PAGE_SIZE_WIDE)
            .await?
        {
            return Ok(id);
        }
        return Err(ApiError::IdUnresolved(market.name.clone()));
    }

    match endpoints.create(market).await {
        Ok(id) => Ok(id),
        Err(ApiError::Status { status: 409, .. }) => {
            debug!("market already exists, resolving via lookup");
            endpoints
                .find(&market.name, &market.address, LOOKUP_PAGE_SIZE)
                .await?
                .ok_or_else(|| ApiError::IdUnresolved(market.name.clone()))
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl MarketDirectory for ApiClient {
    #[instrument(skip(self, market), fields(name = %market.name))]
    async fn ensure(&self, market: &NewMarket) -> Result<MarketId, ApiError> {
        resolve_market_id(self, market).await
    }
}

#[async_trait]
impl FavoriteSync for ApiClient {
    async fn create_favorite(&self, market_id: MarketId, shop_id: ShopId) -> Result<(), ApiError> {
        self.favorite_request(reqwest::Method::POST, market_id, shop_id)
            .await
    }

    async fn delete_favorite(&self, market_id: MarketId, shop_id: ShopId) -> Result<(), ApiError> {
        self.favorite_request(reqwest::Method::DELETE, market_id, shop_id)
            .await
    }
}

#[async_trait]
impl ShopCatalog for ApiClient {
    async fn list_shops(&self, market_id: MarketId) -> Result<Vec<ShopSummary>, ApiError> {
        self.list_market_shops(market_id)
            .await
            .map(|shops| shops.as_ref().clone())
    }
}
