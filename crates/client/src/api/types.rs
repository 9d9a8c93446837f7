//! Wire types for the marketplace REST API.

use serde::{Deserialize, Serialize};
use sijang_core::{MarketId, ShopId};

/// Standard paged envelope returned by listing endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default, rename = "totalElements")]
    pub total_elements: i64,
}

/// A registered market as returned by `GET /markets`.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketRecord {
    #[serde(rename = "marketId")]
    pub market_id: MarketId,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Fields for registering a market discovered on the map.
#[derive(Debug, Clone, Serialize)]
pub struct NewMarket {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub image_urls: Vec<String>,
}

impl NewMarket {
    /// A market with only the fields the map search provides.
    #[must_use]
    pub fn from_place(name: impl Into<String>, address: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            latitude: lat,
            longitude: lng,
            description: String::new(),
            image_urls: Vec::new(),
        }
    }
}

/// Response body of a successful market creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedMarket {
    #[serde(rename = "marketId")]
    pub market_id: Option<MarketId>,
}

/// One shop row from `GET /markets/{id}/shops`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShopSummary {
    #[serde(rename = "shopId")]
    pub shop_id: ShopId,
    pub name: String,
    /// Number of users who favorited this shop; the popularity metric the
    /// frequent-shops ranking sorts by.
    #[serde(default, rename = "favoriteCount")]
    pub favorite_count: i64,
    #[serde(default, rename = "imageUrls")]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Shop detail from `GET /markets/{id}/shops/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShopDetail {
    #[serde(rename = "shopId")]
    pub shop_id: ShopId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "favoriteCount")]
    pub favorite_count: i64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default, rename = "imageUrls")]
    pub image_urls: Vec<String>,
    #[serde(default, rename = "openingHours")]
    pub opening_hours: Option<String>,
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page: Page<MarketRecord> = serde_json::from_str("{}").expect("parses");
        assert!(page.content.is_empty());
        assert_eq!(page.total_elements, 0);
    }

    #[test]
    fn test_shop_summary_parses_backend_shape() {
        let json = r#"{
            "shopId": 42,
            "name": "숙이 떡집",
            "favoriteCount": 12,
            "imageUrls": ["/img/1.jpg"],
            "category": "식품"
        }"#;
        let shop: ShopSummary = serde_json::from_str(json).expect("parses");
        assert_eq!(shop.shop_id, ShopId::new(42));
        assert_eq!(shop.favorite_count, 12);
        assert_eq!(shop.category.as_deref(), Some("식품"));
    }

    #[test]
    fn test_shop_summary_missing_favorite_count_defaults_to_zero() {
        let json = r#"{"shopId": 1, "name": "가게"}"#;
        let shop: ShopSummary = serde_json::from_str(json).expect("parses");
        assert_eq!(shop.favorite_count, 0);
    }

    #[test]
    fn test_created_market_without_id() {
        let created: CreatedMarket = serde_json::from_str("{}").expect("parses");
        assert!(created.market_id.is_none());
    }
}
