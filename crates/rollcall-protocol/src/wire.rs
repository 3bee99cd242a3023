//! Request/response frames exchanged with a hosted authority.
//!
//! Every call to the authority becomes one [`RequestFrame`]; the server
//! answers with exactly one [`ResponseFrame`] carrying the same `id`.
//! The client uses the id to match answers to calls.
//!
//! ```text
//! → {"id":4,"op":"check_in","session_id":7,"subject_id":12,
//!    "evidence":{"kind":"token","value":"9f3c…"}}
//! ← {"id":4,"type":"verdict","data":{"status":"present",…}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{
    ActiveSessionEntry, CheckInRecord, CheckInVerdict, CreateSession,
    Evidence, Session, SessionOverview, SessionStart, Token,
};
use crate::types::{SessionId, SessionStatus, SubjectId};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A request with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    #[serde(flatten)]
    pub request: Request,
}

/// One operation on the authority.
///
/// Internally tagged: the variant name becomes an `"op"` field next to
/// the variant's own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Create {
        params: CreateSession,
    },
    Get {
        session_id: SessionId,
    },
    RegenerateToken {
        session_id: SessionId,
    },
    CheckIn {
        session_id: SessionId,
        subject_id: SubjectId,
        evidence: Evidence,
    },
    Close {
        session_id: SessionId,
    },
    ListActiveForSubject {
        subject_id: SubjectId,
    },
    ListForPresenter {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<SessionStatus>,
    },
    Records {
        session_id: SessionId,
    },
    RecordFor {
        session_id: SessionId,
        subject_id: SubjectId,
    },
}

impl Request {
    /// Short name for logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Get { .. } => "get",
            Self::RegenerateToken { .. } => "regenerate_token",
            Self::CheckIn { .. } => "check_in",
            Self::Close { .. } => "close",
            Self::ListActiveForSubject { .. } => "list_active_for_subject",
            Self::ListForPresenter { .. } => "list_for_presenter",
            Self::Records { .. } => "records",
            Self::RecordFor { .. } => "record_for",
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A response with the id of the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    #[serde(flatten)]
    pub response: Response,
}

/// The payload of a successful call, or the error that replaced it.
///
/// Adjacently tagged (`type` + `data`) so list and optional payloads
/// serialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Response {
    Started(SessionStart),
    Overview(SessionOverview),
    Token(Token),
    Verdict(CheckInVerdict),
    Session(Session),
    ActiveSessions(Vec<ActiveSessionEntry>),
    Sessions(Vec<Session>),
    Records(Vec<CheckInRecord>),
    Record(Option<CheckInRecord>),
    Error(WireError),
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::Overview(_) => "overview",
            Self::Token(_) => "token",
            Self::Verdict(_) => "verdict",
            Self::Session(_) => "session",
            Self::ActiveSessions(_) => "active_sessions",
            Self::Sessions(_) => "sessions",
            Self::Records(_) => "records",
            Self::Record(_) => "record",
            Self::Error(_) => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Errors on the wire
// ---------------------------------------------------------------------------

/// Machine-readable failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    SessionClosed,
    NotEnrolled,
    InvalidRequest,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::SessionClosed => "session_closed",
            Self::NotEnrolled => "not_enrolled",
            Self::InvalidRequest => "invalid_request",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// An error returned by the authority instead of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub message: String,
}

impl WireError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            session_id: None,
            message: message.into(),
        }
    }

    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
