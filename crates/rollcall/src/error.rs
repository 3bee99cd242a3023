//! Unified error type for Rollcall.

use rollcall_authority::AuthorityError;
use rollcall_checkin::CheckInError;
use rollcall_geo::GeoError;
use rollcall_monitor::MonitorError;
use rollcall_protocol::ProtocolError;
use rollcall_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps every crate-specific error.
///
/// Applications using the `rollcall` crate handle this one type; `?`
/// converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RollcallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    CheckIn(#[from] CheckInError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
