//! The per-(subject, session) submission state machine.
//!
//! ```text
//!           check_in_with_location()           check_in_with_token()
//! Idle ──→ Locating ──→ Submitting ──┐   Idle ──→ Submitting ──┐
//!                                    ├──→ Succeeded (terminal) │
//!                                    └──→ Failed ←─────────────┘
//! ```
//!
//! `Failed` is not terminal: another attempt starts over. `Succeeded` is:
//! later attempts return the stored verdict without calling anyone.

use std::sync::Arc;
use std::time::Duration;

use rollcall_authority::Authority;
use rollcall_geo::{check, Coordinates, GeofenceCheck};
use rollcall_protocol::{Evidence, Session, SessionId, SubjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{CheckInError, Locator, PositionOptions, Rejection, ServerVerdict};

/// Settings for the submission flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckInConfig {
    /// Upper bound on acquiring a location fix.
    pub location_timeout_secs: u64,
    pub high_accuracy: bool,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            location_timeout_secs: 15,
            high_accuracy: true,
        }
    }
}

impl CheckInConfig {
    /// Clamp the timeout into `1..=120` seconds.
    pub fn validated(mut self) -> Self {
        self.location_timeout_secs = self.location_timeout_secs.clamp(1, 120);
        self
    }

    /// Options for the locator. Cached fixes are never acceptable.
    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: self.high_accuracy,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_secs(self.location_timeout_secs),
        }
    }
}

/// Where a flow currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Idle,
    Locating,
    Submitting,
    Succeeded(ServerVerdict),
    Failed(CheckInError),
}

impl FlowState {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Drives one subject's check-in for one session.
///
/// Taking `&mut self` for each attempt means a single flow can never
/// have two submissions in flight.
pub struct CheckInFlow<A, L> {
    authority: Arc<A>,
    locator: Arc<L>,
    session_id: SessionId,
    subject_id: SubjectId,
    anchor: Coordinates,
    radius_m: f64,
    config: CheckInConfig,
    state: FlowState,
    preview: Option<GeofenceCheck>,
}

impl<A: Authority, L: Locator> CheckInFlow<A, L> {
    /// `session` is the (redacted) copy from the subject's session list;
    /// its anchor and radius feed the local preview.
    pub fn new(
        authority: Arc<A>,
        locator: Arc<L>,
        subject_id: SubjectId,
        session: &Session,
        config: CheckInConfig,
    ) -> Self {
        Self {
            authority,
            locator,
            session_id: session.id,
            subject_id,
            anchor: session.anchor,
            radius_m: session.radius_m,
            config: config.validated(),
            state: FlowState::Idle,
            preview: None,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// The local, advisory geofence result of the latest location attempt.
    pub fn preview(&self) -> Option<&GeofenceCheck> {
        self.preview.as_ref()
    }

    pub fn verdict(&self) -> Option<&ServerVerdict> {
        match &self.state {
            FlowState::Succeeded(verdict) => Some(verdict),
            _ => None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    /// Geofence path: one fresh fix, a local preview, then the raw reading
    /// goes to the authority.
    pub async fn check_in_with_location(
        &mut self,
    ) -> Result<ServerVerdict, CheckInError> {
        if let Some(done) = self.already_done() {
            return Ok(done);
        }

        self.state = FlowState::Locating;
        let options = self.config.position_options();
        let located =
            tokio::time::timeout(options.timeout, self.locator.locate(&options))
                .await;
        let reading = match located {
            Ok(Ok(reading)) => reading,
            Ok(Err(e)) => return self.fail(e.into()),
            Err(_) => return self.fail(CheckInError::Timeout(options.timeout)),
        };

        let preview = check(
            Some(reading.coords),
            Some(self.anchor),
            self.radius_m,
            reading.accuracy_m,
        );
        if let Some(p) = preview.preview() {
            debug!(
                session_id = %self.session_id,
                distance_m = p.distance_m,
                tolerance_m = p.tolerance_m,
                within = p.within,
                "local geofence preview"
            );
        }
        self.preview = Some(preview);

        self.submit(Evidence::Location { reading }).await
    }

    /// Token path: submit the code the subject scanned.
    pub async fn check_in_with_token(
        &mut self,
        token: &str,
    ) -> Result<ServerVerdict, CheckInError> {
        if let Some(done) = self.already_done() {
            return Ok(done);
        }

        let token = token.trim();
        if token.is_empty() {
            return self.fail(CheckInError::InvalidRequest(
                "no token scanned".into(),
            ));
        }

        self.submit(Evidence::Token {
            value: token.to_string(),
        })
        .await
    }

    fn already_done(&self) -> Option<ServerVerdict> {
        let verdict = self.verdict()?;
        debug!(
            session_id = %self.session_id,
            subject_id = %self.subject_id,
            status = %verdict.status(),
            "already checked in, returning recorded verdict"
        );
        Some(verdict.clone())
    }

    async fn submit(
        &mut self,
        evidence: Evidence,
    ) -> Result<ServerVerdict, CheckInError> {
        self.state = FlowState::Submitting;
        let method = evidence.method();

        let answer = self
            .authority
            .check_in(self.session_id, self.subject_id, evidence)
            .await;
        let verdict = match answer {
            Ok(verdict) => verdict,
            Err(e) => return self.fail(e.into()),
        };

        if let Some(rejection) = Rejection::from_verdict(&verdict) {
            return self.fail(CheckInError::Validation(rejection));
        }

        let verdict = ServerVerdict::from_authority(verdict);
        info!(
            session_id = %self.session_id,
            subject_id = %self.subject_id,
            %method,
            status = %verdict.status(),
            duplicate = verdict.is_duplicate(),
            "check-in accepted"
        );
        self.state = FlowState::Succeeded(verdict.clone());
        Ok(verdict)
    }

    fn fail(
        &mut self,
        err: CheckInError,
    ) -> Result<ServerVerdict, CheckInError> {
        debug!(
            session_id = %self.session_id,
            subject_id = %self.subject_id,
            error = %err,
            retryable = err.is_retryable(),
            "check-in failed"
        );
        self.state = FlowState::Failed(err.clone());
        Err(err)
    }
}
