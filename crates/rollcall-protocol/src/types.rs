//! Identity, time, and status types shared by every Rollcall crate.
//!
//! Everything here is small and `Copy`. The larger records built from
//! these live in `model.rs`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for an attendance session.
///
/// A newtype over `u64` so a `SessionId` can never be passed where a
/// `SubjectId` is expected. `#[serde(transparent)]` keeps the JSON form
/// a bare number: `SessionId(42)` is just `42` on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

/// `tracing::info!(%session_id, "closed")` prints `S-42`.
impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// The person checking in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct SubjectId(pub u64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// The course section a session belongs to. Enrollment is per section.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct SectionId(pub u64);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Wall-clock time in milliseconds since the Unix epoch.
///
/// Only the authority's clock is trusted for anything that decides an
/// outcome. Client timestamps are carried as evidence, never as fact.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// `self + d`, saturating at `u64::MAX`.
    pub fn plus(self, d: Duration) -> Self {
        let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(ms))
    }

    /// Time elapsed from `earlier` to `self`; zero if `earlier` is later.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}ms", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionStatus: lifecycle state machine
// ---------------------------------------------------------------------------

/// Lifecycle of an attendance session.
///
/// ```text
/// Pending ──→ Active ──→ Closed
/// ```
///
/// Transitions only move forward. `Closed` is terminal: nothing reopens a
/// session, and a session is never deleted while anything refers to it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not yet accepting check-ins.
    #[default]
    Pending,
    /// Accepting check-ins until closed or its duration elapses.
    Active,
    /// Finished. Counts are final.
    Closed,
}

impl SessionStatus {
    /// The next state in the lifecycle, or `None` from `Closed`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Active),
            Self::Active => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Forward moves plus the `Pending → Closed` shortcut for sessions
    /// cancelled before they start.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Closed)
                | (Self::Active, Self::Closed)
        )
    }

    /// Only `Active` sessions accept check-ins or rotate tokens.
    pub fn is_open(self) -> bool {
        self == Self::Active
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Check-in enums
// ---------------------------------------------------------------------------

/// Which kind of evidence a check-in carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    Geofence,
    Token,
}

impl fmt::Display for CheckInMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geofence => write!(f, "geofence"),
            Self::Token => write!(f, "token"),
        }
    }
}

/// The authority's adjudicated outcome for a check-in.
///
/// Only the authority produces these. A device's local geofence preview
/// is never converted into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Present,
    Late,
    /// Accepted, but something about the evidence deserves a second look.
    Flagged,
    Rejected,
}

impl CheckInStatus {
    /// Present, late and flagged all count as attendance.
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Late => write!(f, "late"),
            Self::Flagged => write!(f, "flagged"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Why an accepted check-in was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    /// Inside the tolerance only thanks to the fixed slack band.
    BorderlineDistance,
    /// The location fix was too old, or dated in the future.
    AnomalousTiming,
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BorderlineDistance => write!(f, "borderline distance"),
            Self::AnomalousTiming => write!(f, "anomalous timing"),
        }
    }
}

/// Why a check-in was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The reading was farther from the anchor than the tolerance.
    OutOfRange,
    /// The token was valid once but has since been rotated out.
    StaleToken,
    /// The token is still current but its validity window has passed.
    ExpiredToken,
    /// The token was never issued for this session.
    UnknownToken,
}

impl RejectReason {
    /// Token problems are fixed by scanning again; distance is not.
    pub fn is_token_problem(self) -> bool {
        !matches!(self, Self::OutOfRange)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "out of range"),
            Self::StaleToken => write!(f, "stale token"),
            Self::ExpiredToken => write!(f, "expired token"),
            Self::UnknownToken => write!(f, "unknown token"),
        }
    }
}
