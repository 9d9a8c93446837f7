//! Remote marketplace API collaborators.
//!
//! # Architecture
//!
//! - [`ApiClient`] - thin REST client for the marketplace backend (markets,
//!   shops, favorite relationships), with a `moka` cache in front of the
//!   shop-listing endpoint.
//! - [`PlacesClient`] - map-provider REST client used only to discover
//!   nearby market candidates.
//!
//! The stores never depend on the concrete clients: they consume the
//! [`MarketDirectory`], [`FavoriteSync`], and [`ShopCatalog`] traits, which
//! tests implement with deterministic fakes.

mod client;
mod places;
pub mod types;

pub use client::ApiClient;
pub use places::{MarketCandidate, PlacesClient, FALLBACK_CENTER};
pub use types::{NewMarket, ShopDetail, ShopSummary};

use async_trait::async_trait;
use sijang_core::{MarketId, ShopId};
use thiserror::Error;

/// Errors that can occur when talking to remote services.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (network, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// A response body failed to parse.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend reports the market exists but no ID could be resolved.
    #[error("market '{0}' exists but its ID could not be resolved")]
    IdUnresolved(String),

    /// A create response carried no market ID.
    #[error("create response for market '{0}' carried no ID")]
    MissingId(String),
}

/// Market existence/lookup/creation, as consumed by the Selection Store.
#[async_trait]
pub trait MarketDirectory: Send + Sync {
    /// Resolve the remote ID for a market, creating it when it does not
    /// exist yet: exists → lookup, otherwise create (with a 409-conflict on
    /// create treated as "already exists" and retried as a lookup).
    async fn ensure(&self, market: &NewMarket) -> Result<MarketId, ApiError>;
}

/// Favorite relationship confirmation, as consumed by the Favorites Store.
///
/// Both calls are idempotent: re-creating an existing relationship or
/// deleting a missing one is not an error.
#[async_trait]
pub trait FavoriteSync: Send + Sync {
    async fn create_favorite(&self, market_id: MarketId, shop_id: ShopId) -> Result<(), ApiError>;
    async fn delete_favorite(&self, market_id: MarketId, shop_id: ShopId) -> Result<(), ApiError>;
}

/// Shop listing, as consumed by the listing view-model.
#[async_trait]
pub trait ShopCatalog: Send + Sync {
    async fn list_shops(&self, market_id: MarketId) -> Result<Vec<ShopSummary>, ApiError>;
}
