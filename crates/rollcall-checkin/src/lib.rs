//! Subject-side check-in for Rollcall.
//!
//! A [`CheckInFlow`] takes one subject through one check-in, by either of
//! two mutually exclusive paths:
//!
//! - **Geofence**: get a fresh fix from the [`Locator`], show the local
//!   [`GeofencePreview`](rollcall_geo::GeofencePreview), then submit the
//!   raw reading.
//! - **Token**: submit the code scanned from the presenter's screen.
//!
//! Either way the authority decides. The device never turns its own
//! preview into an attendance status; only a [`ServerVerdict`] counts.
//! Failures come back as a [`CheckInError`] with
//! [`user_message`](CheckInError::user_message) text ready to display.

mod error;
mod flow;
mod locate;
mod verdict;

pub use error::{CheckInError, Rejection};
pub use flow::{CheckInConfig, CheckInFlow, FlowState};
pub use locate::{LocateError, Locator, PositionOptions, StaticLocator};
pub use verdict::ServerVerdict;
