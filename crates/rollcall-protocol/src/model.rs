//! Attendance records: sessions, tokens, readings, and verdicts.

use std::time::Duration;

use rollcall_geo::{ACCURACY_CAP_M, Coordinates};
use serde::{Deserialize, Serialize};

use crate::types::{
    CheckInMethod, CheckInStatus, FlagReason, RejectReason, SectionId,
    SessionId, SessionStatus, SubjectId, Timestamp,
};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One attendance session, as the authority stores it.
///
/// `current_token` is only ever populated in presenter-facing copies.
/// Anything sent toward a subject goes through [`Session::redacted`]
/// first, so the rotating token cannot be read off a list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub section_id: SectionId,
    /// The reference point check-ins are measured against.
    pub anchor: Coordinates,
    /// Configured geofence radius before accuracy and slack are added.
    pub radius_m: f64,
    pub opened_at: Timestamp,
    pub duration_minutes: u32,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_token: Option<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_issued_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<Timestamp>,
}

impl Session {
    /// When the session's configured duration runs out.
    pub fn closes_at(&self) -> Timestamp {
        self.opened_at
            .plus(Duration::from_secs(u64::from(self.duration_minutes) * 60))
    }

    /// True once `now` has reached the end of the configured duration.
    pub fn is_due(&self, now: Timestamp) -> bool {
        now >= self.closes_at()
    }

    /// Time left before the duration elapses.
    pub fn remaining(&self, now: Timestamp) -> Duration {
        self.closes_at().saturating_since(now)
    }

    /// A copy safe to hand to subjects: no token material.
    pub fn redacted(&self) -> Session {
        Session {
            current_token: None,
            token_issued_at: None,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A short-lived code displayed by the presenter and scanned by subjects.
///
/// At most one token per session is current. Rotating produces a fresh
/// value and demotes the previous one to stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque, unpredictable value (32 lowercase hex chars).
    pub value: String,
    pub session_id: SessionId,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Token {
    /// Whether the token is still inside its validity window at `now`.
    pub fn is_fresh_at(&self, now: Timestamp) -> bool {
        now <= self.expires_at
    }

    pub fn validity(&self) -> Duration {
        self.expires_at.saturating_since(self.issued_at)
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// A device location fix, exactly as the device reported it.
///
/// The authority recomputes distance from this raw reading; it never
/// trusts a client-computed verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationReading {
    pub coords: Coordinates,
    /// Reported horizontal accuracy, in meters.
    pub accuracy_m: f64,
    /// When the device captured the fix (device clock).
    pub captured_at: Timestamp,
}

impl LocationReading {
    /// A copy that survives JSON, which has no NaN or infinity.
    ///
    /// A non-finite accuracy becomes the allowance cap, the value the
    /// fence uses for it anyway.
    pub fn wire_safe(self) -> Self {
        if self.accuracy_m.is_finite() {
            return self;
        }
        Self {
            accuracy_m: ACCURACY_CAP_M,
            ..self
        }
    }
}

/// What a subject submits to prove attendance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Location { reading: LocationReading },
    Token { value: String },
}

impl Evidence {
    pub fn method(&self) -> CheckInMethod {
        match self {
            Self::Location { .. } => CheckInMethod::Geofence,
            Self::Token { .. } => CheckInMethod::Token,
        }
    }

    /// See [`LocationReading::wire_safe`].
    pub fn wire_safe(self) -> Self {
        match self {
            Self::Location { reading } => Self::Location {
                reading: reading.wire_safe(),
            },
            token => token,
        }
    }
}

// ---------------------------------------------------------------------------
// Records and verdicts
// ---------------------------------------------------------------------------

/// The stored outcome for one subject in one session.
///
/// There is at most one record per `(session_id, subject_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    pub status: CheckInStatus,
    pub method: CheckInMethod,
    /// Distance computed by the authority, for geofence check-ins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<FlagReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectReason>,
    /// Authority time the record was written.
    pub recorded_at: Timestamp,
    /// The raw fix submitted, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<LocationReading>,
}

/// The authority's answer to a check-in submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInVerdict {
    pub status: CheckInStatus,
    pub method: CheckInMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<FlagReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectReason>,
    pub recorded_at: Timestamp,
    /// True when an earlier accepted record was returned unchanged
    /// instead of adjudicating this submission.
    #[serde(default)]
    pub duplicate: bool,
}

impl CheckInVerdict {
    pub fn from_record(record: &CheckInRecord, duplicate: bool) -> Self {
        Self {
            status: record.status,
            method: record.method,
            distance_m: record.distance_m,
            tolerance_m: record.tolerance_m,
            flag: record.flag,
            rejection: record.rejection,
            recorded_at: record.recorded_at,
            duplicate,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status.is_accepted()
    }
}

/// Per-status tallies for one session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub struct AggregateCounts {
    pub present: u32,
    pub late: u32,
    pub flagged: u32,
    pub rejected: u32,
}

impl AggregateCounts {
    /// Adds one record with `status` to the tally.
    pub fn tally(&mut self, status: CheckInStatus) {
        match status {
            CheckInStatus::Present => self.present += 1,
            CheckInStatus::Late => self.late += 1,
            CheckInStatus::Flagged => self.flagged += 1,
            CheckInStatus::Rejected => self.rejected += 1,
        }
    }

    /// Subjects whose attendance counts (everything but rejected).
    pub fn checked_in(&self) -> u32 {
        self.present + self.late + self.flagged
    }

    pub fn total(&self) -> u32 {
        self.checked_in() + self.rejected
    }
}

impl<'a> FromIterator<&'a CheckInRecord> for AggregateCounts {
    fn from_iter<I: IntoIterator<Item = &'a CheckInRecord>>(iter: I) -> Self {
        let mut counts = Self::default();
        for record in iter {
            counts.tally(record.status);
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Authority request/response payloads
// ---------------------------------------------------------------------------

/// Parameters for opening a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSession {
    pub section_id: SectionId,
    pub duration_minutes: u32,
    pub geofence_radius_m: f64,
    pub anchor: Coordinates,
}

/// Returned by `create`: the new session and its first token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    pub session: Session,
    pub token: Token,
}

/// A session together with its live counts, as a presenter sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOverview {
    pub session: Session,
    pub counts: AggregateCounts,
}

/// One open session visible to a subject, with their own status in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSessionEntry {
    /// Always redacted.
    pub session: Session,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_in: Option<CheckInStatus>,
}

impl ActiveSessionEntry {
    /// True when the subject already holds an accepted record.
    pub fn already_checked_in(&self) -> bool {
        self.checked_in.is_some_and(CheckInStatus::is_accepted)
    }
}
