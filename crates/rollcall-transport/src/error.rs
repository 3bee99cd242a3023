use std::io;

/// Errors raised while moving frames between a device and the authority.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound to its address.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Dialing the authority failed.
    #[error("connect to {url} failed: {source}")]
    ConnectFailed {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// A TCP peer connected but never completed the WebSocket upgrade.
    #[error("handshake with {peer} failed: {source}")]
    Handshake {
        peer: String,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// The peer went away mid-exchange.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}
