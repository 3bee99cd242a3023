//! Per-connection handler: decode a request, ask the authority, answer.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! Requests on one connection are answered strictly in order, one
//! response per request, so a client can pair them by id alone.

use std::sync::Arc;

use rollcall_authority::Authority;
use rollcall_protocol::{
    Codec, ErrorCode, Request, RequestFrame, Response, ResponseFrame,
    WireError,
};
use rollcall_transport::{Connection, WebSocketConnection};

use crate::server::ServerState;
use crate::RollcallError;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), RollcallError>
where
    A: Authority,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    loop {
        let data = match tokio::time::timeout(state.idle_timeout, conn.recv())
            .await
        {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection idle, closing");
                break;
            }
        };

        let decoded = state.codec.decode::<RequestFrame>(&data);
        let frame: ResponseFrame = match decoded {
            Ok(RequestFrame { id, request }) => {
                let op = request.op();
                let response =
                    dispatch(state.authority.as_ref(), request).await;
                tracing::trace!(
                    %conn_id,
                    id,
                    op,
                    answer = response.kind(),
                    "request served"
                );
                ResponseFrame { id, response }
            }
            Err(e) => {
                tracing::debug!(
                    %conn_id,
                    error = %e,
                    "failed to decode request"
                );
                ResponseFrame {
                    id: 0,
                    response: Response::Error(WireError::new(
                        ErrorCode::InvalidRequest,
                        format!("malformed request: {e}"),
                    )),
                }
            }
        };

        let bytes = state.codec.encode(&frame)?;
        conn.send(&bytes).await?;
    }

    let _ = conn.close().await;
    Ok(())
}

/// Runs one request against the authority. Refusals become
/// [`Response::Error`]; this never fails.
pub(crate) async fn dispatch<A: Authority>(
    authority: &A,
    request: Request,
) -> Response {
    let op = request.op();
    let answer = match request {
        Request::Create { params } => {
            authority.create(params).await.map(Response::Started)
        }
        Request::Get { session_id } => {
            authority.get(session_id).await.map(Response::Overview)
        }
        Request::RegenerateToken { session_id } => authority
            .regenerate_token(session_id)
            .await
            .map(Response::Token),
        Request::CheckIn {
            session_id,
            subject_id,
            evidence,
        } => authority
            .check_in(session_id, subject_id, evidence)
            .await
            .map(Response::Verdict),
        Request::Close { session_id } => {
            authority.close(session_id).await.map(Response::Session)
        }
        Request::ListActiveForSubject { subject_id } => authority
            .list_active_for_subject(subject_id)
            .await
            .map(Response::ActiveSessions),
        Request::ListForPresenter { status } => authority
            .list_for_presenter(status)
            .await
            .map(Response::Sessions),
        Request::Records { session_id } => {
            authority.records(session_id).await.map(Response::Records)
        }
        Request::RecordFor {
            session_id,
            subject_id,
        } => authority
            .record_for(session_id, subject_id)
            .await
            .map(Response::Record),
    };

    answer.unwrap_or_else(|e| {
        tracing::debug!(op, error = %e, "request refused");
        Response::Error(e.to_wire())
    })
}
