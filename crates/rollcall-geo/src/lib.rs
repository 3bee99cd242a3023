//! Geofence validation for Rollcall.
//!
//! This crate answers one question: "is this device close enough to the
//! anchor?" It is a pure computation with no I/O, no clock and no async,
//! so both sides of the system can run it:
//!
//! - the **subject's device** runs it for instant feedback before
//!   submitting (an advisory [`GeofencePreview`]), and
//! - the **authority** runs the same math again on the raw reading it
//!   receives, and only its answer counts.
//!
//! # The tolerance rule
//!
//! GPS fixes are noisy, so the allowed distance is wider than the
//! configured radius:
//!
//! ```text
//! tolerance = radius + min(accuracy, ACCURACY_CAP_M) + FIXED_SLACK_M
//! ```
//!
//! A distance exactly equal to the tolerance counts as inside.
//!
//! # Example
//!
//! ```rust
//! use rollcall_geo::{check, Coordinates, GeofenceCheck};
//!
//! let anchor = Coordinates::new(41.0082, 28.9784).unwrap();
//! let result = check(Some(anchor), Some(anchor), 15.0, 5.0);
//!
//! match result {
//!     GeofenceCheck::Evaluated(preview) => {
//!         assert_eq!(preview.distance_m, 0.0);
//!         assert_eq!(preview.tolerance_m, 25.0);
//!         assert!(preview.within);
//!     }
//!     GeofenceCheck::Indeterminate(_) => unreachable!(),
//! }
//! ```

mod coords;
mod error;
mod fence;

pub use coords::Coordinates;
pub use error::GeoError;
pub use fence::{
    accuracy_allowance_m, check, evaluate, haversine_m, tolerance_m,
    GeofenceCheck, GeofencePreview, Indeterminate, ACCURACY_CAP_M,
    EARTH_RADIUS_M, FIXED_SLACK_M,
};
