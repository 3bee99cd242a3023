//! The authority's verdict as the subject's device holds it.

use rollcall_protocol::{
    CheckInMethod, CheckInStatus, CheckInVerdict, FlagReason, Timestamp,
};

/// An accepted verdict that came back from the authority.
///
/// The field is private and the only constructor is crate-internal, fed
/// exclusively by an authority response. In particular there is no way to
/// build one from a [`GeofencePreview`](rollcall_geo::GeofencePreview):
/// a device that believes it is in range still has to be told so.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerVerdict(CheckInVerdict);

impl ServerVerdict {
    pub(crate) fn from_authority(verdict: CheckInVerdict) -> Self {
        Self(verdict)
    }

    pub fn status(&self) -> CheckInStatus {
        self.0.status
    }

    pub fn method(&self) -> CheckInMethod {
        self.0.method
    }

    pub fn flag(&self) -> Option<FlagReason> {
        self.0.flag
    }

    pub fn recorded_at(&self) -> Timestamp {
        self.0.recorded_at
    }

    /// The authority answered from an earlier accepted record.
    pub fn is_duplicate(&self) -> bool {
        self.0.duplicate
    }

    pub fn verdict(&self) -> &CheckInVerdict {
        &self.0
    }

    pub fn into_inner(self) -> CheckInVerdict {
        self.0
    }
}
