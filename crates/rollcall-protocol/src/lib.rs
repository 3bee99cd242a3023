//! Data model and wire protocol for Rollcall.
//!
//! This crate defines what travels between presenters, subjects and the
//! attendance authority:
//!
//! - **Identity and time** ([`SessionId`], [`SubjectId`], [`SectionId`],
//!   [`Timestamp`]): small newtypes so IDs can't be mixed up.
//! - **Model** ([`Session`], [`Token`], [`CheckInRecord`],
//!   [`LocationReading`], [`Evidence`], [`CheckInVerdict`]): the
//!   attendance records themselves.
//! - **Wire** ([`RequestFrame`], [`ResponseFrame`]): how calls to the
//!   authority are framed when they cross a socket.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): frames to bytes and back.
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Authority (adjudication)
//! ```

mod codec;
mod error;
mod model;
mod types;
mod wire;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use model::{
    ActiveSessionEntry, AggregateCounts, CheckInRecord, CheckInVerdict,
    CreateSession, Evidence, LocationReading, Session, SessionOverview,
    SessionStart, Token,
};
pub use types::{
    CheckInMethod, CheckInStatus, FlagReason, RejectReason, SectionId,
    SessionId, SessionStatus, SubjectId, Timestamp,
};
pub use wire::{
    ErrorCode, Request, RequestFrame, Response, ResponseFrame, WireError,
};

/// Re-exported so downstream crates can name coordinates without a
/// direct dependency on `rollcall-geo`.
pub use rollcall_geo::Coordinates;
