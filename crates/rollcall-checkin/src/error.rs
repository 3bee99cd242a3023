//! The user-facing error taxonomy for a check-in attempt.

use std::fmt;
use std::time::Duration;

use rollcall_authority::AuthorityError;
use rollcall_protocol::{CheckInVerdict, RejectReason, SessionId};

use crate::LocateError;

/// Why the authority refused a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The device was farther away than the tolerance.
    OutOfRange { distance_m: f64, tolerance_m: f64 },
    /// The scanned token was stale, expired or never issued.
    Token(RejectReason),
}

impl Rejection {
    /// Extracts the rejection from a verdict, if it is one.
    pub fn from_verdict(verdict: &CheckInVerdict) -> Option<Self> {
        if verdict.status.is_accepted() {
            return None;
        }
        Some(match verdict.rejection {
            Some(RejectReason::OutOfRange) | None => Self::OutOfRange {
                distance_m: verdict.distance_m.unwrap_or(f64::NAN),
                tolerance_m: verdict.tolerance_m.unwrap_or(f64::NAN),
            },
            Some(reason) => Self::Token(reason),
        })
    }

    /// How far beyond the tolerance the device was.
    pub fn excess_m(&self) -> Option<f64> {
        match self {
            Self::OutOfRange {
                distance_m,
                tolerance_m,
            } => Some((distance_m - tolerance_m).max(0.0)),
            Self::Token(_) => None,
        }
    }

    /// Token rejections are fixed by scanning the code on screen again.
    pub fn needs_rescan(&self) -> bool {
        matches!(self, Self::Token(_))
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange {
                distance_m,
                tolerance_m,
            } => write!(
                f,
                "{distance_m:.0} m from the anchor, {:.0} m beyond the allowed {tolerance_m:.0} m",
                self.excess_m().unwrap_or_default()
            ),
            Self::Token(reason) => write!(f, "{reason}"),
        }
    }
}

/// Everything that can go wrong with one check-in attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckInError {
    /// Location access is denied. Retryable once the user changes it.
    #[error("location permission denied")]
    Permission,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("location timed out after {0:?}")]
    Timeout(Duration),

    /// The authority adjudicated and refused. Only new evidence helps.
    #[error("check-in rejected: {0}")]
    Validation(Rejection),

    #[error("network error: {0}")]
    Network(String),

    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("not enrolled in session {0}")]
    NotEnrolled(SessionId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The authority failed in an unexpected way.
    #[error("authority failure: {0}")]
    Internal(String),
}

impl CheckInError {
    /// Whether trying the same thing again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Permission
                | Self::Unavailable(_)
                | Self::Timeout(_)
                | Self::Network(_)
                | Self::Internal(_)
        )
    }

    /// Text to show the person checking in.
    pub fn user_message(&self) -> String {
        match self {
            Self::Permission => "Location access is off. Allow it in \
                                 settings, then try again."
                .to_string(),
            Self::Unavailable(_) => {
                "Your location could not be determined. Try again.".to_string()
            }
            Self::Timeout(_) => {
                "Finding your location took too long. Try again.".to_string()
            }
            Self::Validation(Rejection::OutOfRange {
                distance_m,
                tolerance_m,
            }) => format!(
                "You are {distance_m:.0} m away, {:.0} m beyond the allowed \
                 {tolerance_m:.0} m. Move closer and try again.",
                (distance_m - tolerance_m).max(0.0)
            ),
            Self::Validation(Rejection::Token(RejectReason::UnknownToken)) => {
                "That code isn't valid for this session. Scan the code on \
                 screen."
                    .to_string()
            }
            Self::Validation(Rejection::Token(_)) => {
                "That code has expired. Scan the code currently on screen."
                    .to_string()
            }
            Self::Network(_) | Self::Internal(_) => {
                "Could not reach the attendance service. Try again.".to_string()
            }
            Self::SessionClosed(_) => "This session has closed.".to_string(),
            Self::NotFound(_) => "This session no longer exists.".to_string(),
            Self::NotEnrolled(_) => {
                "You are not enrolled in this section.".to_string()
            }
            Self::InvalidRequest(_) => {
                "This check-in could not be processed.".to_string()
            }
        }
    }
}

impl From<LocateError> for CheckInError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::PermissionDenied => Self::Permission,
            LocateError::Unavailable(why) => Self::Unavailable(why),
            LocateError::Timeout(after) => Self::Timeout(after),
        }
    }
}

impl From<AuthorityError> for CheckInError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::NotFound(id) => Self::NotFound(id),
            AuthorityError::Closed(id) => Self::SessionClosed(id),
            AuthorityError::NotEnrolled(id) => Self::NotEnrolled(id),
            AuthorityError::InvalidRequest(why) => Self::InvalidRequest(why),
            AuthorityError::Transport(why) => Self::Network(why),
            AuthorityError::Internal(why) => Self::Internal(why),
        }
    }
}
