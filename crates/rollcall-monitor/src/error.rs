//! Error types for the monitor views.

use rollcall_authority::AuthorityError;
use rollcall_protocol::SessionId;

/// Errors raised while setting up or closing a view.
///
/// Failures inside the background loops are never returned; they show up
/// as events instead.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// `attach` was pointed at a session that has already ended.
    #[error("session {0} is already closed")]
    AlreadyClosed(SessionId),
}
