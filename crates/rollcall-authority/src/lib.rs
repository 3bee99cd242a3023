//! Session lifecycle contract and reference authority for Rollcall.
//!
//! This crate owns every decision about attendance:
//!
//! 1. **Contract**: the [`Authority`] trait that presenter and subject
//!    code call (create, rotate, check in, close, list)
//! 2. **Rules**: [`SessionRegistry`], which adjudicates submissions
//!    against the current token or the geofence
//! 3. **Reference implementation**: [`InMemoryAuthority`], the registry
//!    behind a mutex with a [`Clock`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Monitor / Check-in flow (above)  ← call the Authority trait
//!     ↕
//! Authority (this crate)  ← sessions, tokens, records, verdicts
//!     ↕
//! Protocol + Geo (below)  ← data model, haversine tolerance
//! ```

mod authority;
mod clock;
mod error;
mod memory;
mod policy;
mod registry;

pub use authority::Authority;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthorityError;
pub use memory::InMemoryAuthority;
pub use policy::AdjudicationPolicy;
pub use registry::SessionRegistry;
