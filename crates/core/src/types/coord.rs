//! Geographic coordinates.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair.
///
/// Also serves as the synthetic identity for a market discovered on the map
/// before it has a remote ID: [`Coordinates::synthetic_key`] produces a
/// stable `"lat,lng"` string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Create a new coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Coordinate-derived key, unique enough to identify an unregistered
    /// market in the saved list.
    #[must_use]
    pub fn synthetic_key(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lng)
    }
}
