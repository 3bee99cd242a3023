//! The contract every attendance authority fulfils.
//!
//! Rollcall never decides attendance on the device. Presenter and subject
//! code talk to an [`Authority`], which owns session state, issues tokens,
//! and adjudicates every check-in. Implementations in this workspace:
//!
//! - [`InMemoryAuthority`](crate::InMemoryAuthority): the reference
//!   adjudicator, used in tests, the demo and the hosted server
//! - `RemoteAuthority` (in the `rollcall` crate): the same contract over
//!   a WebSocket connection
//!
//! # Trait bounds
//!
//! `Send + Sync + 'static` because views share one authority between
//! several background loops, and each returned future is `Send` so those
//! loops can be spawned on Tokio's multi-threaded runtime.

use std::future::Future;

use rollcall_protocol::{
    ActiveSessionEntry, CheckInRecord, CheckInVerdict, CreateSession,
    Evidence, Session, SessionId, SessionOverview, SessionStart,
    SessionStatus, SubjectId, Token,
};

use crate::AuthorityError;

/// The session lifecycle service.
///
/// Token material only leaves the authority through [`create`] and
/// [`regenerate_token`]. Sessions returned by every other call are
/// redacted, except the presenter listing.
///
/// [`create`]: Authority::create
/// [`regenerate_token`]: Authority::regenerate_token
pub trait Authority: Send + Sync + 'static {
    /// Opens a new session (pending, then active at once) and issues its
    /// first token.
    fn create(
        &self,
        params: CreateSession,
    ) -> impl Future<Output = Result<SessionStart, AuthorityError>> + Send;

    /// The session (redacted) and its live counts.
    fn get(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<SessionOverview, AuthorityError>> + Send;

    /// Rotates the session's token. The previous one becomes stale.
    ///
    /// # Errors
    /// `Closed` once the session has ended.
    fn regenerate_token(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Token, AuthorityError>> + Send;

    /// Adjudicates one submission.
    ///
    /// A repeated submission after an accepted one returns the recorded
    /// verdict with `duplicate = true` and writes nothing.
    fn check_in(
        &self,
        session_id: SessionId,
        subject_id: SubjectId,
        evidence: Evidence,
    ) -> impl Future<Output = Result<CheckInVerdict, AuthorityError>> + Send;

    /// Ends the session. Closing a closed session returns it unchanged.
    fn close(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Session, AuthorityError>> + Send;

    /// Open sessions in the subject's sections, with their own status.
    fn list_active_for_subject(
        &self,
        subject_id: SubjectId,
    ) -> impl Future<Output = Result<Vec<ActiveSessionEntry>, AuthorityError>>
    + Send;

    /// Every session, optionally filtered by status, oldest first.
    fn list_for_presenter(
        &self,
        status: Option<SessionStatus>,
    ) -> impl Future<Output = Result<Vec<Session>, AuthorityError>> + Send;

    /// The roster: every record written for the session.
    fn records(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<CheckInRecord>, AuthorityError>>
    + Send;

    /// One subject's record in a session, if any.
    fn record_for(
        &self,
        session_id: SessionId,
        subject_id: SubjectId,
    ) -> impl Future<Output = Result<Option<CheckInRecord>, AuthorityError>>
    + Send;
}
