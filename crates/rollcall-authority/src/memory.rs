//! The reference authority: a [`SessionRegistry`] behind a Tokio mutex.

use rollcall_protocol::{
    ActiveSessionEntry, CheckInRecord, CheckInVerdict, CreateSession,
    Evidence, SectionId, Session, SessionId, SessionOverview, SessionStart,
    SessionStatus, SubjectId, Token,
};
use tokio::sync::Mutex;

use crate::{
    AdjudicationPolicy, Authority, AuthorityError, Clock, SessionRegistry,
    SystemClock,
};

/// An in-process [`Authority`].
///
/// Every call reads the clock once and runs the registry rules under the
/// lock, so concurrent submissions and rotations are serialized: a
/// check-in always sees either the token before a rotation or the one
/// after it, never a mix.
///
/// ```rust
/// use rollcall_authority::{AdjudicationPolicy, Authority, InMemoryAuthority};
/// use rollcall_protocol::{Coordinates, CreateSession, SectionId};
///
/// # async fn demo() -> Result<(), rollcall_authority::AuthorityError> {
/// let authority = InMemoryAuthority::new(AdjudicationPolicy::default());
/// let start = authority
///     .create(CreateSession {
///         section_id: SectionId(1),
///         duration_minutes: 50,
///         geofence_radius_m: 15.0,
///         anchor: Coordinates { lat: 41.0082, lon: 28.9784 },
///     })
///     .await?;
/// assert_eq!(start.token.value.len(), 32);
/// # Ok(())
/// # }
/// ```
pub struct InMemoryAuthority<C: Clock = SystemClock> {
    registry: Mutex<SessionRegistry>,
    clock: C,
}

impl InMemoryAuthority<SystemClock> {
    pub fn new(policy: AdjudicationPolicy) -> Self {
        Self::with_clock(policy, SystemClock::new())
    }
}

impl<C: Clock> InMemoryAuthority<C> {
    pub fn with_clock(policy: AdjudicationPolicy, clock: C) -> Self {
        Self {
            registry: Mutex::new(SessionRegistry::new(policy)),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Enrollment is owned by an external directory; this is how it is
    /// fed in. Returns `false` if the subject was already enrolled.
    pub async fn enroll(&self, section: SectionId, subject: SubjectId) -> bool {
        self.registry.lock().await.enroll(section, subject)
    }

    /// Closes every session whose duration has elapsed.
    pub async fn sweep_expired(&self) -> Vec<SessionId> {
        let now = self.clock.now();
        self.registry.lock().await.expire_due(now)
    }
}

impl<C: Clock> Authority for InMemoryAuthority<C> {
    async fn create(
        &self,
        params: CreateSession,
    ) -> Result<SessionStart, AuthorityError> {
        let now = self.clock.now();
        self.registry.lock().await.create(params, now)
    }

    async fn get(
        &self,
        session_id: SessionId,
    ) -> Result<SessionOverview, AuthorityError> {
        let now = self.clock.now();
        self.registry.lock().await.get(session_id, now)
    }

    async fn regenerate_token(
        &self,
        session_id: SessionId,
    ) -> Result<Token, AuthorityError> {
        let now = self.clock.now();
        self.registry.lock().await.regenerate_token(session_id, now)
    }

    async fn check_in(
        &self,
        session_id: SessionId,
        subject_id: SubjectId,
        evidence: Evidence,
    ) -> Result<CheckInVerdict, AuthorityError> {
        let now = self.clock.now();
        self.registry
            .lock()
            .await
            .check_in(session_id, subject_id, &evidence, now)
    }

    async fn close(
        &self,
        session_id: SessionId,
    ) -> Result<Session, AuthorityError> {
        let now = self.clock.now();
        self.registry.lock().await.close(session_id, now)
    }

    async fn list_active_for_subject(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<ActiveSessionEntry>, AuthorityError> {
        let now = self.clock.now();
        Ok(self
            .registry
            .lock()
            .await
            .list_active_for_subject(subject_id, now))
    }

    async fn list_for_presenter(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, AuthorityError> {
        let now = self.clock.now();
        Ok(self.registry.lock().await.list_for_presenter(status, now))
    }

    async fn records(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<CheckInRecord>, AuthorityError> {
        let now = self.clock.now();
        self.registry.lock().await.records(session_id, now)
    }

    async fn record_for(
        &self,
        session_id: SessionId,
        subject_id: SubjectId,
    ) -> Result<Option<CheckInRecord>, AuthorityError> {
        let now = self.clock.now();
        self.registry
            .lock()
            .await
            .record_for(session_id, subject_id, now)
    }
}
