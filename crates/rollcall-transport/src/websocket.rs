//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Both ends use the same stream type: the accepting side wraps its TCP
//! stream in `MaybeTlsStream::Plain` so [`WebSocketConnection`] serves
//! the server handler and the remote client alike.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message, error::ProtocolError};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Transport, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

fn io_error(kind: ErrorKind, err: tungstenite::Error) -> std::io::Error {
    std::io::Error::new(kind, err)
}

/// A WebSocket [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a listener to `addr` (e.g. `"127.0.0.1:0"`).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(stream))
            .await
            .map_err(|e| TransportError::Handshake {
                peer: addr.to_string(),
                source: io_error(ErrorKind::InvalidData, e),
            })?;

        let id = next_id();
        tracing::debug!(%id, %addr, "accepted WebSocket connection");
        Ok(WebSocketConnection::new(id, ws))
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// A single WebSocket connection.
///
/// Send and receive share one lock, so a pending `recv` holds off a
/// concurrent `send`. Callers that need full duplex use one task per
/// connection and alternate.
pub struct WebSocketConnection {
    id: ConnectionId,
    ws: Arc<Mutex<WsStream>>,
}

impl WebSocketConnection {
    fn new(id: ConnectionId, ws: WsStream) -> Self {
        Self {
            id,
            ws: Arc::new(Mutex::new(ws)),
        }
    }

    /// Dials a WebSocket endpoint such as `ws://127.0.0.1:7300`.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                url: url.to_string(),
                source: io_error(ErrorKind::ConnectionRefused, e),
            })?;

        let id = next_id();
        tracing::debug!(%id, url, "connected WebSocket client");
        Ok(Self::new(id, ws))
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        self.ws.lock().await.send(msg).await.map_err(|e| match e {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed => {
                TransportError::ConnectionClosed(e.to_string())
            }
            other => TransportError::SendFailed(io_error(
                ErrorKind::BrokenPipe,
                other,
            )),
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let msg = self.ws.lock().await.next().await;
            match msg {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io_error(
                        ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        match self.ws.lock().await.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed)
            | Err(tungstenite::Error::Protocol(
                ProtocolError::SendAfterClosing,
            )) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(io_error(
                ErrorKind::BrokenPipe,
                e,
            ))),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
