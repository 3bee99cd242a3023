//! Error types for coordinate validation.

/// A coordinate that cannot be used for distance math.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeoError {
    /// Latitude or longitude was NaN or infinite.
    #[error("coordinate is not a finite number")]
    NotFinite,

    /// Latitude outside `-90.0..=90.0`.
    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),

    /// Longitude outside `-180.0..=180.0`.
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),
}
