//! Haversine distance and the tolerance verdict.

use crate::{Coordinates, GeoError};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Largest share of a device's reported accuracy that may widen the fence.
/// A phone claiming ±200 m must not turn a classroom into a campus.
pub const ACCURACY_CAP_M: f64 = 20.0;

/// Constant slack added to every fence to absorb rounding and drift.
pub const FIXED_SLACK_M: f64 = 5.0;

/// Great-circle distance between two points, in meters.
///
/// Inputs are expected to be validated ([`Coordinates::validate`]);
/// [`check`] does that for you.
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    // Float error can push `h` a hair above 1.0 for antipodal points,
    // which would make `asin` return NaN.
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// How much of a reported accuracy may widen the fence.
///
/// Missing, negative or non-finite hints count as the worst case
/// (the full cap) so a broken sensor never shrinks or disables the rule.
pub fn accuracy_allowance_m(accuracy_m: f64) -> f64 {
    if accuracy_m.is_finite() && accuracy_m >= 0.0 {
        accuracy_m.min(ACCURACY_CAP_M)
    } else {
        ACCURACY_CAP_M
    }
}

/// `radius + min(accuracy, ACCURACY_CAP_M) + FIXED_SLACK_M`.
pub fn tolerance_m(radius_m: f64, accuracy_m: f64) -> f64 {
    radius_m.max(0.0) + accuracy_allowance_m(accuracy_m) + FIXED_SLACK_M
}

/// A locally computed geofence result.
///
/// This is an *advisory preview*: it tells the person holding the device
/// where they stand before anything is submitted. It carries no authority
/// and the submission flow never converts it into an attendance status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofencePreview {
    /// Great-circle distance to the anchor.
    pub distance_m: f64,
    /// The allowed distance after accuracy and slack are applied.
    pub tolerance_m: f64,
    /// `distance_m <= tolerance_m`.
    pub within: bool,
}

impl GeofencePreview {
    /// How far past the tolerance the device is (0 when within).
    pub fn excess_m(&self) -> f64 {
        (self.distance_m - self.tolerance_m).max(0.0)
    }
}

/// Builds a preview from an already-known distance.
pub fn evaluate(
    distance_m: f64,
    radius_m: f64,
    accuracy_m: f64,
) -> GeofencePreview {
    let tolerance_m = tolerance_m(radius_m, accuracy_m);
    GeofencePreview {
        distance_m,
        tolerance_m,
        within: distance_m <= tolerance_m,
    }
}

/// Why a check could not produce a verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Indeterminate {
    /// No fix for the subject's device.
    MissingSubject,
    /// The session has no anchor location.
    MissingAnchor,
    /// The subject's fix is not a usable coordinate.
    InvalidSubject(GeoError),
    /// The anchor is not a usable coordinate.
    InvalidAnchor(GeoError),
}

/// Outcome of [`check`].
///
/// `Indeterminate` is neither a pass nor a fail. Callers that need a
/// boolean have to decide what "unknown" means for them explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeofenceCheck {
    Evaluated(GeofencePreview),
    Indeterminate(Indeterminate),
}

impl GeofenceCheck {
    /// The preview, if both coordinates were present and valid.
    pub fn preview(&self) -> Option<&GeofencePreview> {
        match self {
            Self::Evaluated(preview) => Some(preview),
            Self::Indeterminate(_) => None,
        }
    }

    /// `Some(within)` for evaluated checks, `None` when indeterminate.
    pub fn within(&self) -> Option<bool> {
        self.preview().map(|p| p.within)
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate(_))
    }
}

/// Runs the full geofence check for a subject against an anchor.
pub fn check(
    subject: Option<Coordinates>,
    anchor: Option<Coordinates>,
    radius_m: f64,
    accuracy_m: f64,
) -> GeofenceCheck {
    let Some(subject) = subject else {
        return GeofenceCheck::Indeterminate(Indeterminate::MissingSubject);
    };
    let Some(anchor) = anchor else {
        return GeofenceCheck::Indeterminate(Indeterminate::MissingAnchor);
    };
    if let Err(e) = subject.validate() {
        return GeofenceCheck::Indeterminate(Indeterminate::InvalidSubject(e));
    }
    if let Err(e) = anchor.validate() {
        return GeofenceCheck::Indeterminate(Indeterminate::InvalidAnchor(e));
    }

    let distance = haversine_m(subject, anchor);
    GeofenceCheck::Evaluated(evaluate(distance, radius_m, accuracy_m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lon: f64) -> Coordinates {
        Coordinates::new(lat, lon).unwrap()
    }

    /// A point `meters` due north of `origin`.
    fn north_of(origin: Coordinates, meters: f64) -> Coordinates {
        c(origin.lat + (meters / EARTH_RADIUS_M).to_degrees(), origin.lon)
    }

    const ISTANBUL: (f64, f64) = (41.0082, 28.9784);

    // =====================================================================
    // haversine_m()
    // =====================================================================

    #[test]
    fn test_haversine_same_point_is_zero() {
        for (lat, lon) in [(0.0, 0.0), ISTANBUL, (-33.86, 151.21), (90.0, 0.0)]
        {
            let a = c(lat, lon);
            assert_eq!(haversine_m(a, a), 0.0);
        }
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let pairs = [
            (c(41.0082, 28.9784), c(41.0090, 28.9800)),
            (c(-33.86, 151.21), c(51.5, -0.12)),
            (c(0.0, 179.9), c(0.0, -179.9)),
        ];
        for (a, b) in pairs {
            let ab = haversine_m(a, b);
            let ba = haversine_m(b, a);
            assert!((ab - ba).abs() < 1e-9, "{ab} != {ba}");
        }
    }

    #[test]
    fn test_haversine_known_distance_london_paris() {
        // Roughly 343.5 km between the two city centers.
        let london = c(51.5074, -0.1278);
        let paris = c(48.8566, 2.3522);
        let d = haversine_m(london, paris);
        assert!((d - 343_500.0).abs() < 1_000.0, "got {d}");
    }

    #[test]
    fn test_haversine_antipodal_points_is_half_circumference() {
        let d = haversine_m(c(0.0, 0.0), c(0.0, 180.0));
        let expected = std::f64::consts::PI * EARTH_RADIUS_M;
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_crosses_antimeridian_short_way() {
        // 0.2 degrees of longitude at the equator, not 359.8.
        let d = haversine_m(c(0.0, 179.9), c(0.0, -179.9));
        assert!(d < 25_000.0, "got {d}");
    }

    // =====================================================================
    // tolerance_m()
    // =====================================================================

    #[test]
    fn test_tolerance_radius_15_accuracy_10_is_30() {
        assert_eq!(tolerance_m(15.0, 10.0), 30.0);
    }

    #[test]
    fn test_tolerance_caps_accuracy_contribution() {
        assert_eq!(tolerance_m(15.0, 20.0), 40.0);
        assert_eq!(tolerance_m(15.0, 500.0), 40.0);
    }

    #[test]
    fn test_tolerance_non_decreasing_in_accuracy() {
        let mut prev = tolerance_m(15.0, 0.0);
        let mut acc = 0.0;
        while acc <= 100.0 {
            let t = tolerance_m(15.0, acc);
            assert!(t >= prev, "tolerance dropped at accuracy {acc}");
            assert!(t <= 15.0 + ACCURACY_CAP_M + FIXED_SLACK_M);
            prev = t;
            acc += 0.5;
        }
    }

    #[test]
    fn test_tolerance_bad_accuracy_counts_as_cap() {
        assert_eq!(tolerance_m(10.0, f64::NAN), 35.0);
        assert_eq!(tolerance_m(10.0, -3.0), 35.0);
    }

    // =====================================================================
    // evaluate(): inclusive boundary
    // =====================================================================

    #[test]
    fn test_evaluate_distance_equal_to_tolerance_is_within() {
        let p = evaluate(30.0, 15.0, 10.0);
        assert_eq!(p.tolerance_m, 30.0);
        assert!(p.within);
        assert_eq!(p.excess_m(), 0.0);
    }

    #[test]
    fn test_evaluate_just_past_tolerance_is_outside() {
        let p = evaluate(30.01, 15.0, 10.0);
        assert!(!p.within);
        assert!((p.excess_m() - 0.01).abs() < 1e-9);
    }

    // =====================================================================
    // check()
    // =====================================================================

    #[test]
    fn test_check_same_coordinates_accuracy_5_is_within() {
        let anchor = c(ISTANBUL.0, ISTANBUL.1);
        let result = check(Some(anchor), Some(anchor), 15.0, 5.0);

        let preview = result.preview().expect("should evaluate");
        assert_eq!(preview.distance_m, 0.0);
        assert_eq!(preview.tolerance_m, 25.0);
        assert!(preview.within);
    }

    #[test]
    fn test_check_fifty_meters_away_reports_excess() {
        let anchor = c(ISTANBUL.0, ISTANBUL.1);
        let subject = north_of(anchor, 50.0);

        let result = check(Some(subject), Some(anchor), 15.0, 5.0);

        let preview = result.preview().expect("should evaluate");
        assert!((preview.distance_m - 50.0).abs() < 1e-6);
        assert_eq!(preview.tolerance_m, 25.0);
        assert!(!preview.within);
        assert!((preview.excess_m() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_check_missing_subject_is_indeterminate() {
        let anchor = c(ISTANBUL.0, ISTANBUL.1);
        let result = check(None, Some(anchor), 15.0, 5.0);
        assert_eq!(
            result,
            GeofenceCheck::Indeterminate(Indeterminate::MissingSubject)
        );
        assert_eq!(result.within(), None);
    }

    #[test]
    fn test_check_missing_anchor_is_indeterminate() {
        let subject = c(ISTANBUL.0, ISTANBUL.1);
        let result = check(Some(subject), None, 15.0, 5.0);
        assert!(result.is_indeterminate());
        assert_eq!(result.within(), None);
    }

    #[test]
    fn test_check_invalid_subject_is_indeterminate_not_fail() {
        let anchor = c(ISTANBUL.0, ISTANBUL.1);
        let broken = Coordinates { lat: f64::NAN, lon: 0.0 };
        let result = check(Some(broken), Some(anchor), 15.0, 5.0);
        assert_eq!(
            result,
            GeofenceCheck::Indeterminate(Indeterminate::InvalidSubject(
                GeoError::NotFinite
            ))
        );
    }
}
