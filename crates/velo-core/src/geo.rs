//! Geographic position reported to the bike-share service.

use serde::{Deserialize, Serialize};

/// A client geo position as sent in `clientGeoPosition` request fields.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPosition {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPosition {
    /// Create a position from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// The `{0, 0}` position the service accepts when no fix is available.
    #[must_use]
    pub const fn origin() -> Self {
        Self { lat: 0.0, lon: 0.0 }
    }
}
