//! Latitude/longitude pairs in decimal degrees.

use serde::{Deserialize, Serialize};

use crate::GeoError;

/// A point on the Earth's surface, in decimal degrees (WGS84).
///
/// The fields are public because readings arrive from devices and the
/// wire as plain numbers. Anything that feeds distance math goes through
/// [`Coordinates::validate`] first; [`Coordinates::new`] does it for you.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Builds a validated coordinate pair.
    ///
    /// # Errors
    /// See [`Coordinates::validate`].
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        let coords = Self { lat, lon };
        coords.validate()?;
        Ok(coords)
    }

    /// Checks that both components are finite and within range.
    ///
    /// # Errors
    /// - [`GeoError::NotFinite`] for NaN or infinite components
    /// - [`GeoError::LatitudeOutOfRange`] / [`GeoError::LongitudeOutOfRange`]
    pub fn validate(&self) -> Result<(), GeoError> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(GeoError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(GeoError::LatitudeOutOfRange(self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(GeoError::LongitudeOutOfRange(self.lon));
        }
        Ok(())
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}
