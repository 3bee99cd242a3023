//! Error types for authority calls.

use rollcall_protocol::{ErrorCode, SessionId, WireError};

/// Errors an [`Authority`](crate::Authority) can return.
///
/// The first five variants are answers from the authority itself and
/// cross the wire as a [`WireError`]. `Transport` never does: it is raised
/// on the client side when the authority could not be reached at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthorityError {
    /// No session exists with this id.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The session is closed; nothing about it can change any more.
    #[error("session {0} is closed")]
    Closed(SessionId),

    /// The caller is not enrolled in the session's section.
    #[error("not enrolled in the section of session {0}")]
    NotEnrolled(SessionId),

    /// The request itself is malformed (bad coordinates, zero duration...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The authority answered with an unexpected failure.
    #[error("authority failure: {0}")]
    Internal(String),

    /// The authority could not be reached or the connection dropped.
    #[error("authority unreachable: {0}")]
    Transport(String),
}

impl AuthorityError {
    /// Network-class failures are worth retrying unchanged.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The session this error is about, when there is one.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::NotFound(id) | Self::Closed(id) | Self::NotEnrolled(id) => {
                Some(*id)
            }
            _ => None,
        }
    }

    /// Encodes the error for a response frame.
    pub fn to_wire(&self) -> WireError {
        let code = match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Closed(_) => ErrorCode::SessionClosed,
            Self::NotEnrolled(_) => ErrorCode::NotEnrolled,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Internal(_) | Self::Transport(_) => ErrorCode::Internal,
        };
        let wire = WireError::new(code, self.to_string());
        match self.session_id() {
            Some(id) => wire.for_session(id),
            None => wire,
        }
    }
}

impl From<WireError> for AuthorityError {
    fn from(err: WireError) -> Self {
        match (err.code, err.session_id) {
            (ErrorCode::NotFound, Some(id)) => Self::NotFound(id),
            (ErrorCode::SessionClosed, Some(id)) => Self::Closed(id),
            (ErrorCode::NotEnrolled, Some(id)) => Self::NotEnrolled(id),
            (ErrorCode::InvalidRequest, _) => Self::InvalidRequest(err.message),
            _ => Self::Internal(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire_then_back_keeps_session_errors() {
        for err in [
            AuthorityError::NotFound(SessionId(1)),
            AuthorityError::Closed(SessionId(2)),
            AuthorityError::NotEnrolled(SessionId(3)),
        ] {
            assert_eq!(AuthorityError::from(err.to_wire()), err);
        }
    }

    #[test]
    fn test_to_wire_closed_uses_session_closed_code() {
        let wire = AuthorityError::Closed(SessionId(9)).to_wire();
        assert_eq!(wire.code, ErrorCode::SessionClosed);
        assert_eq!(wire.session_id, Some(SessionId(9)));
    }

    #[test]
    fn test_from_wire_missing_session_falls_back_to_internal() {
        let wire = WireError::new(ErrorCode::NotFound, "gone");
        assert_eq!(
            AuthorityError::from(wire),
            AuthorityError::Internal("gone".into())
        );
    }

    #[test]
    fn test_is_network_only_for_transport() {
        assert!(AuthorityError::Transport("reset".into()).is_network());
        assert!(!AuthorityError::Internal("boom".into()).is_network());
        assert!(!AuthorityError::Closed(SessionId(1)).is_network());
    }
}
