//! [`Authority`] over a WebSocket connection to an [`AuthorityServer`].
//!
//! [`AuthorityServer`]: crate::AuthorityServer

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rollcall_authority::{Authority, AuthorityError};
use rollcall_protocol::{
    ActiveSessionEntry, CheckInRecord, CheckInVerdict, Codec, CreateSession,
    Evidence, JsonCodec, Request, RequestFrame, Response, ResponseFrame,
    Session, SessionId, SessionOverview, SessionStart, SessionStatus,
    SubjectId, Token,
};
use rollcall_transport::{Connection, WebSocketConnection};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default bound on one round trip.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A client for a hosted authority.
///
/// Calls share one connection and go out one at a time. The connection
/// is opened on first use. If the authority closed it while it sat idle,
/// the call redials once and resends. Any other break fails that call
/// with [`AuthorityError::Transport`] and the next call reconnects.
pub struct RemoteAuthority<C = JsonCodec> {
    url: String,
    codec: C,
    conn: Mutex<Option<WebSocketConnection>>,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl RemoteAuthority<JsonCodec> {
    /// A client for `url` (e.g. `ws://127.0.0.1:9400`). Nothing is
    /// dialed until the first call.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            codec: JsonCodec,
            conn: Mutex::new(None),
            next_id: AtomicU64::new(1),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl<C: Codec> RemoteAuthority<C> {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one request and waits for its answer.
    ///
    /// Error answers are converted here, so callers only ever see the
    /// payload they asked for or an `AuthorityError`.
    async fn call(&self, request: Request) -> Result<Response, AuthorityError> {
        let op = request.op();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bytes = self
            .codec
            .encode(&RequestFrame { id, request })
            .map_err(|e| AuthorityError::Internal(e.to_string()))?;

        let mut slot = self.conn.lock().await;
        let reused = slot.is_some();
        let answer = match self.exchange(&mut slot, op, id, &bytes).await {
            // The authority closes idle connections. Only a connection
            // that sat in the slot can be dead before we spoke.
            Err(Trip::Dropped(e)) if reused => {
                debug!(
                    url = %self.url,
                    op,
                    error = %e,
                    "pooled connection was dropped, redialing"
                );
                *slot = None;
                self.exchange(&mut slot, op, id, &bytes).await
            }
            other => other,
        };

        match answer.map_err(Trip::into_error) {
            Ok(Response::Error(err)) => Err(err.into()),
            Ok(response) => Ok(response),
            Err(e) => {
                if e.is_network() {
                    warn!(
                        url = %self.url,
                        op,
                        error = %e,
                        "authority connection lost"
                    );
                    *slot = None;
                }
                Err(e)
            }
        }
    }

    /// Dials if needed, then one timed round trip.
    async fn exchange(
        &self,
        slot: &mut Option<WebSocketConnection>,
        op: &str,
        id: u64,
        bytes: &[u8],
    ) -> Result<Response, Trip> {
        if slot.is_none() {
            let conn = WebSocketConnection::connect(&self.url)
                .await
                .map_err(|e| Trip::failed(e.to_string()))?;
            debug!(
                url = %self.url,
                conn_id = %conn.id(),
                "connected to authority"
            );
            *slot = Some(conn);
        }
        let Some(conn) = slot.as_ref() else {
            return Err(Trip::failed("not connected"));
        };

        let within = self.call_timeout;
        tokio::time::timeout(within, self.round_trip(conn, id, bytes))
            .await
            .unwrap_or_else(|_| {
                Err(Trip::failed(format!(
                    "no answer to {op} within {within:?}"
                )))
            })
    }

    async fn round_trip(
        &self,
        conn: &WebSocketConnection,
        id: u64,
        bytes: &[u8],
    ) -> Result<Response, Trip> {
        conn.send(bytes)
            .await
            .map_err(|e| Trip::dropped(e.to_string()))?;

        loop {
            let data = conn
                .recv()
                .await
                .map_err(|e| Trip::dropped(e.to_string()))?
                .ok_or_else(|| {
                    Trip::dropped("connection closed by authority")
                })?;
            let frame: ResponseFrame = self.codec.decode(&data).map_err(|e| {
                Trip::Failed(AuthorityError::Internal(e.to_string()))
            })?;
            match frame {
                ResponseFrame { id: got, response } if got == id => {
                    return Ok(response);
                }
                // Requests go out one at a time, so an error the server
                // could not tie to an id belongs to this one.
                ResponseFrame {
                    id: 0,
                    response: response @ Response::Error(_),
                } => return Ok(response),
                // An answer to a call that timed out earlier.
                ResponseFrame { id: got, .. } => {
                    debug!(expected = id, got, "dropping stale response");
                }
            }
        }
    }
}

/// How one round trip went wrong.
enum Trip {
    /// The connection was gone before an answer arrived.
    Dropped(AuthorityError),
    Failed(AuthorityError),
}

impl Trip {
    fn dropped(message: impl Into<String>) -> Self {
        Self::Dropped(AuthorityError::Transport(message.into()))
    }

    fn failed(message: impl Into<String>) -> Self {
        Self::Failed(AuthorityError::Transport(message.into()))
    }

    fn into_error(self) -> AuthorityError {
        match self {
            Self::Dropped(e) | Self::Failed(e) => e,
        }
    }
}

fn unexpected(op: &str, response: Response) -> AuthorityError {
    AuthorityError::Internal(format!(
        "unexpected {} answer to {op}",
        response.kind()
    ))
}

impl<C: Codec> Authority for RemoteAuthority<C> {
    async fn create(
        &self,
        params: CreateSession,
    ) -> Result<SessionStart, AuthorityError> {
        match self.call(Request::Create { params }).await? {
            Response::Started(start) => Ok(start),
            other => Err(unexpected("create", other)),
        }
    }

    async fn get(
        &self,
        session_id: SessionId,
    ) -> Result<SessionOverview, AuthorityError> {
        match self.call(Request::Get { session_id }).await? {
            Response::Overview(overview) => Ok(overview),
            other => Err(unexpected("get", other)),
        }
    }

    async fn regenerate_token(
        &self,
        session_id: SessionId,
    ) -> Result<Token, AuthorityError> {
        match self.call(Request::RegenerateToken { session_id }).await? {
            Response::Token(token) => Ok(token),
            other => Err(unexpected("regenerate_token", other)),
        }
    }

    async fn check_in(
        &self,
        session_id: SessionId,
        subject_id: SubjectId,
        evidence: Evidence,
    ) -> Result<CheckInVerdict, AuthorityError> {
        let request = Request::CheckIn {
            session_id,
            subject_id,
            evidence: evidence.wire_safe(),
        };
        match self.call(request).await? {
            Response::Verdict(verdict) => Ok(verdict),
            other => Err(unexpected("check_in", other)),
        }
    }

    async fn close(
        &self,
        session_id: SessionId,
    ) -> Result<Session, AuthorityError> {
        match self.call(Request::Close { session_id }).await? {
            Response::Session(session) => Ok(session),
            other => Err(unexpected("close", other)),
        }
    }

    async fn list_active_for_subject(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<ActiveSessionEntry>, AuthorityError> {
        match self.call(Request::ListActiveForSubject { subject_id }).await? {
            Response::ActiveSessions(entries) => Ok(entries),
            other => Err(unexpected("list_active_for_subject", other)),
        }
    }

    async fn list_for_presenter(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, AuthorityError> {
        match self.call(Request::ListForPresenter { status }).await? {
            Response::Sessions(sessions) => Ok(sessions),
            other => Err(unexpected("list_for_presenter", other)),
        }
    }

    async fn records(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<CheckInRecord>, AuthorityError> {
        match self.call(Request::Records { session_id }).await? {
            Response::Records(records) => Ok(records),
            other => Err(unexpected("records", other)),
        }
    }

    async fn record_for(
        &self,
        session_id: SessionId,
        subject_id: SubjectId,
    ) -> Result<Option<CheckInRecord>, AuthorityError> {
        let request = Request::RecordFor {
            session_id,
            subject_id,
        };
        match self.call(request).await? {
            Response::Record(record) => Ok(record),
            other => Err(unexpected("record_for", other)),
        }
    }
}
