//! Live session monitoring for Rollcall.
//!
//! Everything in this crate is a loop that keeps a screen current:
//!
//! - [`RotationHandle`]: rotates a session's QR token every 15 s and runs
//!   the countdown beside it
//! - [`PresenterView`]: opens or attaches to a session, owns its rotation,
//!   polls live counts and reports closure exactly once
//! - [`SubjectView`]: discovers the sessions a subject can check in to and
//!   notices when they close
//!
//! Each loop runs on its own [`Cadence`](rollcall_cadence::Cadence) inside
//! a task owned by the handle or view that started it. There are no global
//! timers: dropping a view stops everything it was doing.
//!
//! All state lives with the [`Authority`](rollcall_authority::Authority).
//! Views only read it and publish what they saw through `watch` channels
//! and an event stream.

mod config;
mod error;
mod presenter;
mod rotation;
mod subject;
mod task;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use presenter::{PresenterEvent, PresenterView};
pub use rotation::{
    RotationEvent, RotationHandle, RotationStopper, TokenDisplay,
};
pub use subject::{
    Affordance, Cards, SessionCard, SubjectEvent, SubjectView,
};
