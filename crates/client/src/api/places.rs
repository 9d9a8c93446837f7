//! Map-provider places search.
//!
//! Queries the Kakao Local REST API for markets near a coordinate. This is
//! the only map-SDK surface the state model consumes: marker rendering and
//! geocoding stay in the view layer.

use secrecy::ExposeSecret;
use serde::Deserialize;
use sijang_core::Coordinates;
use tracing::instrument;

use super::ApiError;
use crate::config::PlacesConfig;

/// Keyword-search endpoint.
const SEARCH_URL: &str = "https://dapi.kakao.com/v2/local/search/keyword.json";
/// Keyword used to discover traditional markets.
const MARKET_KEYWORD: &str = "시장";
/// Search radius in meters.
const SEARCH_RADIUS_M: u32 = 4000;

/// Map center to fall back to when geolocation fails.
pub const FALLBACK_CENTER: Coordinates = Coordinates::new(36.7794, 127.0036);

/// A nearby market returned by the places search.
///
/// `place_id` is the provider's ID when it supplies one; entries without one
/// fall back to the coordinate-derived key.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketCandidate {
    pub place_id: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub coords: Coordinates,
}

impl MarketCandidate {
    /// Stable saved-list key: the place ID when known, else `"lat,lng"`.
    #[must_use]
    pub fn key(&self) -> String {
        self.place_id
            .clone()
            .unwrap_or_else(|| self.coords.synthetic_key())
    }
}

/// Kakao Local API client.
#[derive(Clone)]
pub struct PlacesClient {
    http: reqwest::Client,
    api_key: secrecy::SecretString,
}

impl PlacesClient {
    /// Create a client from configuration.
    #[must_use]
    pub fn new(config: &PlacesConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
        }
    }

    /// Search for markets within [`SEARCH_RADIUS_M`] of `center`.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the provider rejects the
    /// API key.
    #[instrument(skip(self), fields(center = %center))]
    pub async fn nearby_markets(
        &self,
        center: Coordinates,
    ) -> Result<Vec<MarketCandidate>, ApiError> {
        let response = self
            .http
            .get(SEARCH_URL)
            .header(
                "Authorization",
                format!("KakaoAK {}", self.api_key.expose_secret()),
            )
            .query(&[
                ("query", MARKET_KEYWORD),
                ("x", &center.lng.to_string()),
                ("y", &center.lat.to_string()),
                ("radius", &SEARCH_RADIUS_M.to_string()),
            ])
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

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(body
            .documents
            .into_iter()
            .filter_map(document_to_candidate)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    documents: Vec<PlaceDocument>,
}

/// One hit from the keyword search. Coordinates come back as strings.
#[derive(Debug, Deserialize)]
struct PlaceDocument {
    #[serde(default)]
    id: Option<String>,
    place_name: String,
    #[serde(default)]
    road_address_name: String,
    #[serde(default)]
    address_name: String,
    /// Longitude.
    x: String,
    /// Latitude.
    y: String,
}

/// Convert a raw document, preferring the road address and dropping hits
/// with unparseable coordinates.
fn document_to_candidate(doc: PlaceDocument) -> Option<MarketCandidate> {
    let lat = doc.y.parse::<f64>().ok()?;
    let lng = doc.x.parse::<f64>().ok()?;
    let address = if doc.road_address_name.is_empty() {
        doc.address_name
    } else {
        doc.road_address_name
    };
    Some(MarketCandidate {
        place_id: doc.id.filter(|id| !id.is_empty()),
        name: doc.place_name,
        address: (!address.is_empty()).then_some(address),
        coords: Coordinates::new(lat, lng),
    })
}
