//! # Rollcall
//!
//! Attendance verification for live sessions. A presenter opens a session
//! and puts a QR code on screen that rotates every 15 seconds; subjects
//! check in either by scanning the code or by proving, with a fresh
//! location fix, that they are inside the session's geofence. An
//! [`Authority`](rollcall_authority::Authority) adjudicates every
//! submission; devices only ever show what it decided.
//!
//! This crate ties the layers together:
//!
//! ```text
//! PresenterView / SubjectView / CheckInFlow   (rollcall-monitor, -checkin)
//!         │  Authority trait
//!         ├── InMemoryAuthority               (rollcall-authority)
//!         └── RemoteAuthority ── WebSocket ── AuthorityServer (this crate)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rollcall::prelude::*;
//!
//! # async fn demo() -> Result<(), RollcallError> {
//! let config = RollcallConfig::load("rollcall.json")?;
//! rollcall::logging::init(config.log_filter());
//!
//! let authority = Arc::new(InMemoryAuthority::new(config.policy.clone()));
//! let server = AuthorityServer::builder()
//!     .config(&config.server)
//!     .build(authority)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
pub mod logging;
mod remote;
mod server;

pub use config::{ConfigError, RollcallConfig, ServerConfig};
pub use error::RollcallError;
pub use remote::{RemoteAuthority, DEFAULT_CALL_TIMEOUT};
pub use server::{AuthorityServer, AuthorityServerBuilder};

pub use rollcall_authority as authority;
pub use rollcall_cadence as cadence;
pub use rollcall_checkin as checkin;
pub use rollcall_geo as geo;
pub use rollcall_monitor as monitor;
pub use rollcall_protocol as protocol;
pub use rollcall_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        AuthorityServer, RemoteAuthority, RollcallConfig, RollcallError,
    };
    pub use rollcall_authority::{
        AdjudicationPolicy, Authority, AuthorityError, InMemoryAuthority,
    };
    pub use rollcall_checkin::{
        CheckInError, CheckInFlow, Locator, ServerVerdict, StaticLocator,
    };
    pub use rollcall_geo::{Coordinates, GeofenceCheck, GeofencePreview};
    pub use rollcall_monitor::{
        Affordance, MonitorConfig, PresenterEvent, PresenterView,
        SubjectEvent, SubjectView,
    };
    pub use rollcall_protocol::{
        CheckInStatus, CreateSession, SectionId, SessionId, SubjectId,
    };
}
