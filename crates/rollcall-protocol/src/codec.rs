//! Codec trait and the JSON implementation.
//!
//! The server and the remote client never call `serde_json` directly;
//! they hold something that implements [`Codec`]. Swapping in a binary
//! format later only touches this module.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// `Send + Sync + 'static` because a codec lives inside long-running
/// connection tasks that Tokio may move between threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes into an owned value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` for malformed or mismatched input.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// Frames stay human-readable, which is handy when tailing a socket
/// while a session is running.
///
/// ```rust
/// use rollcall_protocol::{Codec, JsonCodec, Request, RequestFrame, SessionId};
///
/// let codec = JsonCodec;
/// let frame = RequestFrame {
///     id: 1,
///     request: Request::Get { session_id: SessionId(7) },
/// };
///
/// let bytes = codec.encode(&frame).unwrap();
/// let decoded: RequestFrame = codec.decode(&bytes).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
