#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use rollcall_authority::{
    AdjudicationPolicy, Authority, AuthorityError, InMemoryAuthority,
};
use rollcall_protocol::{
    ActiveSessionEntry, CheckInRecord, CheckInVerdict, Coordinates,
    CreateSession, Evidence, SectionId, Session, SessionId, SessionOverview,
    SessionStart, SessionStatus, SubjectId, Token,
};

pub const SECTION: SectionId = SectionId(7);
pub const SUBJECT: SubjectId = SubjectId(100);

/// The reference authority with switches for injecting failures.
pub struct Flaky {
    pub inner: InMemoryAuthority,
    /// The next N rotations fail with a transport error.
    pub fail_rotations: AtomicU32,
    /// `get` and `list_active_for_subject` fail while set.
    pub fail_reads: AtomicBool,
    pub rotation_calls: AtomicU32,
    pub list_calls: AtomicU32,
}

impl Flaky {
    pub fn rotations(&self) -> u32 {
        self.rotation_calls.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn read_failure(&self) -> Result<(), AuthorityError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AuthorityError::Transport("read refused".into()));
        }
        Ok(())
    }
}

impl Authority for Flaky {
    async fn create(
        &self,
        params: CreateSession,
    ) -> Result<SessionStart, AuthorityError> {
        self.inner.create(params).await
    }

    async fn get(
        &self,
        session_id: SessionId,
    ) -> Result<SessionOverview, AuthorityError> {
        self.read_failure()?;
        self.inner.get(session_id).await
    }

    async fn regenerate_token(
        &self,
        session_id: SessionId,
    ) -> Result<Token, AuthorityError> {
        self.rotation_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_rotations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(AuthorityError::Transport("rotation refused".into()));
        }
        self.inner.regenerate_token(session_id).await
    }

    async fn check_in(
        &self,
        session_id: SessionId,
        subject_id: SubjectId,
        evidence: Evidence,
    ) -> Result<CheckInVerdict, AuthorityError> {
        self.inner.check_in(session_id, subject_id, evidence).await
    }

    async fn close(
        &self,
        session_id: SessionId,
    ) -> Result<Session, AuthorityError> {
        self.inner.close(session_id).await
    }

    async fn list_active_for_subject(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<ActiveSessionEntry>, AuthorityError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.read_failure()?;
        self.inner.list_active_for_subject(subject_id).await
    }

    async fn list_for_presenter(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, AuthorityError> {
        self.inner.list_for_presenter(status).await
    }

    async fn records(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<CheckInRecord>, AuthorityError> {
        self.inner.records(session_id).await
    }

    async fn record_for(
        &self,
        session_id: SessionId,
        subject_id: SubjectId,
    ) -> Result<Option<CheckInRecord>, AuthorityError> {
        self.inner.record_for(session_id, subject_id).await
    }
}

pub async fn authority() -> Arc<Flaky> {
    let inner = InMemoryAuthority::new(AdjudicationPolicy::default());
    inner.enroll(SECTION, SUBJECT).await;
    Arc::new(Flaky {
        inner,
        fail_rotations: AtomicU32::new(0),
        fail_reads: AtomicBool::new(false),
        rotation_calls: AtomicU32::new(0),
        list_calls: AtomicU32::new(0),
    })
}

pub fn params(duration_minutes: u32) -> CreateSession {
    CreateSession {
        section_id: SECTION,
        duration_minutes,
        geofence_radius_m: 15.0,
        anchor: Coordinates {
            lat: 41.0082,
            lon: 28.9784,
        },
    }
}

/// Checks `SUBJECT` in with a token.
pub async fn check_in_with(
    authority: &Flaky,
    session_id: SessionId,
    token: &str,
) -> CheckInVerdict {
    authority
        .check_in(
            session_id,
            SUBJECT,
            Evidence::Token {
                value: token.to_string(),
            },
        )
        .await
        .unwrap()
}

/// Advances paused time and lets every woken task run.
pub async fn advance(by: Duration) {
    tokio::time::sleep(by).await;
}

/// Lets spawned tasks catch up without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
