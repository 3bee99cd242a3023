//! Error types for the protocol layer.

/// Errors raised while turning frames into bytes or back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not a valid frame: malformed JSON, missing fields,
    /// or an unknown `op`/`type` tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Decoded fine but breaks a protocol rule, e.g. a response whose
    /// id doesn't match the request it answers.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
