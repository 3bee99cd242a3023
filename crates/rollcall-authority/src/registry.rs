//! The session registry: all attendance state and the adjudication rules.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself. It is plain maps and
//! takes the current time as an argument, so every rule here is a
//! synchronous, deterministic function of its inputs.
//! [`InMemoryAuthority`](crate::InMemoryAuthority) puts it behind a Tokio
//! mutex and supplies the clock.
//!
//! # Lifecycle
//!
//! ```text
//! create() ──→ [Active] ──→ close() / duration elapsed ──→ [Closed]
//!                 │                                           │
//!     regenerate_token(), check_in()                 read-only forever
//! ```
//!
//! Expiry is lazy: every call first closes the sessions it touches whose
//! duration has run out, so no background timer is needed for
//! correctness. [`SessionRegistry::expire_due`] closes everything due at
//! once.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use rand::Rng;
use rollcall_geo::{accuracy_allowance_m, evaluate, haversine_m};
use rollcall_protocol::{
    ActiveSessionEntry, AggregateCounts, CheckInRecord, CheckInStatus,
    CheckInVerdict, CreateSession, Evidence, FlagReason, LocationReading,
    RejectReason, SectionId, Session, SessionId, SessionOverview,
    SessionStart, SessionStatus, SubjectId, Timestamp, Token,
};
use tracing::{debug, info};

use crate::{AdjudicationPolicy, AuthorityError};

/// Owns every session, token, record and enrollment.
pub struct SessionRegistry {
    policy: AdjudicationPolicy,

    /// Ordered by id so listings come out oldest first.
    sessions: BTreeMap<SessionId, Session>,

    /// Rotated-out token values per session, oldest first. Bounded by
    /// `policy.retired_token_memory`; dropped entirely at close.
    retired: HashMap<SessionId, VecDeque<String>>,

    /// At most one record per (session, subject). Ordered so a session's
    /// records form one contiguous range.
    records: BTreeMap<(SessionId, SubjectId), CheckInRecord>,

    enrollments: HashMap<SectionId, HashSet<SubjectId>>,

    next_id: u64,
}

impl SessionRegistry {
    pub fn new(policy: AdjudicationPolicy) -> Self {
        Self {
            policy: policy.validated(),
            sessions: BTreeMap::new(),
            retired: HashMap::new(),
            records: BTreeMap::new(),
            enrollments: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn policy(&self) -> &AdjudicationPolicy {
        &self.policy
    }

    // -- Enrollment -------------------------------------------------------

    /// Adds a subject to a section. Returns `false` if already enrolled.
    pub fn enroll(&mut self, section: SectionId, subject: SubjectId) -> bool {
        self.enrollments.entry(section).or_default().insert(subject)
    }

    pub fn is_enrolled(&self, section: SectionId, subject: SubjectId) -> bool {
        self.enrollments
            .get(&section)
            .is_some_and(|members| members.contains(&subject))
    }

    // -- Lifecycle --------------------------------------------------------

    /// Opens a session and issues its first token.
    ///
    /// # Errors
    /// `InvalidRequest` for a zero duration, a negative or non-finite
    /// radius, or an invalid anchor.
    pub fn create(
        &mut self,
        params: CreateSession,
        now: Timestamp,
    ) -> Result<SessionStart, AuthorityError> {
        validate_params(&params)?;

        self.next_id += 1;
        let id = SessionId(self.next_id);

        let mut session = Session {
            id,
            section_id: params.section_id,
            anchor: params.anchor,
            radius_m: params.geofence_radius_m,
            opened_at: now,
            duration_minutes: params.duration_minutes,
            status: SessionStatus::Pending,
            current_token: None,
            token_issued_at: None,
            closed_at: None,
        };
        advance(&mut session, SessionStatus::Active);

        let retired = self.retired.entry(id).or_default();
        let token = issue_token(&mut session, retired, &self.policy, now);

        info!(
            session_id = %id,
            section_id = %session.section_id,
            duration_minutes = session.duration_minutes,
            radius_m = session.radius_m,
            "session opened"
        );

        let start = SessionStart {
            session: session.redacted(),
            token,
        };
        self.sessions.insert(id, session);
        Ok(start)
    }

    /// Closes every session whose duration has elapsed by `now`.
    ///
    /// Returns the ids that were closed by this call.
    pub fn expire_due(&mut self, now: Timestamp) -> Vec<SessionId> {
        let mut closed = Vec::new();
        for session in self.sessions.values_mut() {
            if !session.status.is_closed() && session.is_due(now) {
                let at = session.closes_at();
                finish(session, &mut self.retired, at, "duration elapsed");
                closed.push(session.id);
            }
        }
        closed
    }

    /// Closes one session if its duration has elapsed.
    fn expire_if_due(
        &mut self,
        id: SessionId,
        now: Timestamp,
    ) -> Result<(), AuthorityError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(AuthorityError::NotFound(id))?;
        if !session.status.is_closed() && session.is_due(now) {
            let at = session.closes_at();
            finish(session, &mut self.retired, at, "duration elapsed");
        }
        Ok(())
    }

    /// Closes the session now. Idempotent: closing a closed session
    /// returns it unchanged.
    pub fn close(
        &mut self,
        id: SessionId,
        now: Timestamp,
    ) -> Result<Session, AuthorityError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(AuthorityError::NotFound(id))?;

        if session.status.is_closed() {
            debug!(session_id = %id, "close on closed session, no-op");
        } else if session.is_due(now) {
            let at = session.closes_at();
            finish(session, &mut self.retired, at, "duration elapsed");
        } else {
            finish(session, &mut self.retired, now, "closed by presenter");
        }
        Ok(session.redacted())
    }

    /// Replaces the session's token. The old value becomes stale.
    pub fn regenerate_token(
        &mut self,
        id: SessionId,
        now: Timestamp,
    ) -> Result<Token, AuthorityError> {
        self.expire_if_due(id, now)?;
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(AuthorityError::NotFound(id))?;
        if !session.status.is_open() {
            return Err(AuthorityError::Closed(id));
        }

        let retired = self.retired.entry(id).or_default();
        let token = issue_token(session, retired, &self.policy, now);
        debug!(session_id = %id, issued_at = %now, "token rotated");
        Ok(token)
    }

    // -- Check-in ---------------------------------------------------------

    /// Adjudicates a submission and stores the outcome.
    ///
    /// # Errors
    /// - `NotFound` / `Closed` for a missing or finished session
    /// - `NotEnrolled` if the subject isn't in the session's section
    /// - `InvalidRequest` for a location with invalid coordinates
    pub fn check_in(
        &mut self,
        id: SessionId,
        subject: SubjectId,
        evidence: &Evidence,
        now: Timestamp,
    ) -> Result<CheckInVerdict, AuthorityError> {
        self.expire_if_due(id, now)?;
        let session =
            self.sessions.get(&id).ok_or(AuthorityError::NotFound(id))?;
        if !session.status.is_open() {
            return Err(AuthorityError::Closed(id));
        }
        if !self.is_enrolled(session.section_id, subject) {
            return Err(AuthorityError::NotEnrolled(id));
        }

        // Accepted statuses are final; a rejected one may be replaced.
        if let Some(existing) = self.records.get(&(id, subject)) {
            if existing.status.is_accepted() {
                debug!(
                    session_id = %id,
                    subject_id = %subject,
                    status = %existing.status,
                    "repeat submission, returning recorded status"
                );
                return Ok(CheckInVerdict::from_record(existing, true));
            }
        }

        let record = self.adjudicate(session, subject, evidence, now)?;
        let verdict = CheckInVerdict::from_record(&record, false);

        info!(
            session_id = %id,
            subject_id = %subject,
            method = %record.method,
            status = %record.status,
            distance_m = ?record.distance_m,
            flag = ?record.flag,
            rejection = ?record.rejection,
            "check-in adjudicated"
        );

        self.records.insert((id, subject), record);
        Ok(verdict)
    }

    fn adjudicate(
        &self,
        session: &Session,
        subject: SubjectId,
        evidence: &Evidence,
        now: Timestamp,
    ) -> Result<CheckInRecord, AuthorityError> {
        let mut record = CheckInRecord {
            session_id: session.id,
            subject_id: subject,
            status: CheckInStatus::Present,
            method: evidence.method(),
            distance_m: None,
            tolerance_m: None,
            flag: None,
            rejection: None,
            recorded_at: now,
            reading: None,
        };

        match evidence {
            Evidence::Token { value } => {
                if let Some(reason) = self.token_problem(session, value, now) {
                    record.status = CheckInStatus::Rejected;
                    record.rejection = Some(reason);
                    return Ok(record);
                }
            }
            Evidence::Location { reading } => {
                reading.coords.validate().map_err(|e| {
                    AuthorityError::InvalidRequest(format!("location: {e}"))
                })?;
                record.reading = Some(*reading);

                let distance = haversine_m(reading.coords, session.anchor);
                let preview =
                    evaluate(distance, session.radius_m, reading.accuracy_m);
                record.distance_m = Some(preview.distance_m);
                record.tolerance_m = Some(preview.tolerance_m);

                if !preview.within {
                    record.status = CheckInStatus::Rejected;
                    record.rejection = Some(RejectReason::OutOfRange);
                    return Ok(record);
                }
                record.flag =
                    self.location_flag(session, reading, distance, now);
            }
        }

        let late_at = session.opened_at.plus(self.policy.late_after());
        record.status = if record.flag.is_some() {
            CheckInStatus::Flagged
        } else if now > late_at {
            CheckInStatus::Late
        } else {
            CheckInStatus::Present
        };
        Ok(record)
    }

    /// `None` if the token is the current one and still honored.
    fn token_problem(
        &self,
        session: &Session,
        value: &str,
        now: Timestamp,
    ) -> Option<RejectReason> {
        match &session.current_token {
            Some(current) if current.value == value => {
                let honored_until =
                    current.expires_at.plus(self.policy.token_grace());
                (now > honored_until).then_some(RejectReason::ExpiredToken)
            }
            _ => {
                let retired = self
                    .retired
                    .get(&session.id)
                    .is_some_and(|old| old.iter().any(|t| t == value));
                Some(if retired {
                    RejectReason::StaleToken
                } else {
                    RejectReason::UnknownToken
                })
            }
        }
    }

    /// Flags an in-tolerance location that deserves a second look.
    fn location_flag(
        &self,
        session: &Session,
        reading: &LocationReading,
        distance_m: f64,
        now: Timestamp,
    ) -> Option<FlagReason> {
        // Inside only because of the fixed slack band.
        let strict = session.radius_m.max(0.0)
            + accuracy_allowance_m(reading.accuracy_m);
        if distance_m > strict {
            return Some(FlagReason::BorderlineDistance);
        }

        let age = now.saturating_since(reading.captured_at);
        let ahead = reading.captured_at.saturating_since(now);
        if age > self.policy.max_fix_age()
            || ahead > self.policy.max_clock_skew()
        {
            return Some(FlagReason::AnomalousTiming);
        }
        None
    }

    // -- Queries ----------------------------------------------------------

    /// The session (redacted) and its counts.
    pub fn get(
        &mut self,
        id: SessionId,
        now: Timestamp,
    ) -> Result<SessionOverview, AuthorityError> {
        self.expire_if_due(id, now)?;
        let session =
            self.sessions.get(&id).ok_or(AuthorityError::NotFound(id))?;
        Ok(SessionOverview {
            session: session.redacted(),
            counts: self.counts(id),
        })
    }

    pub fn counts(&self, id: SessionId) -> AggregateCounts {
        self.records_of(id).collect()
    }

    fn records_of(
        &self,
        id: SessionId,
    ) -> impl Iterator<Item = &CheckInRecord> + '_ {
        self.records
            .range((id, SubjectId(0))..=(id, SubjectId(u64::MAX)))
            .map(|(_, record)| record)
    }

    /// Open sessions in the subject's sections, redacted, with the
    /// subject's own status.
    pub fn list_active_for_subject(
        &mut self,
        subject: SubjectId,
        now: Timestamp,
    ) -> Vec<ActiveSessionEntry> {
        self.expire_due(now);
        self.sessions
            .values()
            .filter(|s| s.status.is_open())
            .filter(|s| self.is_enrolled(s.section_id, subject))
            .map(|s| ActiveSessionEntry {
                session: s.redacted(),
                checked_in: self
                    .records
                    .get(&(s.id, subject))
                    .map(|r| r.status),
            })
            .collect()
    }

    /// Every session, optionally filtered by status. Presenter-facing, so
    /// open sessions keep their current token.
    pub fn list_for_presenter(
        &mut self,
        status: Option<SessionStatus>,
        now: Timestamp,
    ) -> Vec<Session> {
        self.expire_due(now);
        self.sessions
            .values()
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect()
    }

    pub fn records(
        &mut self,
        id: SessionId,
        now: Timestamp,
    ) -> Result<Vec<CheckInRecord>, AuthorityError> {
        self.expire_if_due(id, now)?;
        Ok(self.records_of(id).cloned().collect())
    }

    pub fn record_for(
        &mut self,
        id: SessionId,
        subject: SubjectId,
        now: Timestamp,
    ) -> Result<Option<CheckInRecord>, AuthorityError> {
        self.expire_if_due(id, now)?;
        Ok(self.records.get(&(id, subject)).cloned())
    }

    /// Raw access for inspection; includes token material.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_params(params: &CreateSession) -> Result<(), AuthorityError> {
    if params.duration_minutes == 0 {
        return Err(AuthorityError::InvalidRequest(
            "duration_minutes must be at least 1".into(),
        ));
    }
    if !params.geofence_radius_m.is_finite() || params.geofence_radius_m < 0.0 {
        return Err(AuthorityError::InvalidRequest(format!(
            "geofence radius {} is not a usable distance",
            params.geofence_radius_m
        )));
    }
    params
        .anchor
        .validate()
        .map_err(|e| AuthorityError::InvalidRequest(format!("anchor: {e}")))
}

/// Moves the session along its lifecycle if the transition is legal.
fn advance(session: &mut Session, to: SessionStatus) {
    if session.status.can_transition_to(to) {
        debug!(
            session_id = %session.id,
            from = %session.status,
            %to,
            "session transition"
        );
        session.status = to;
    }
}

fn finish(
    session: &mut Session,
    retired: &mut HashMap<SessionId, VecDeque<String>>,
    closed_at: Timestamp,
    reason: &'static str,
) {
    advance(session, SessionStatus::Closed);
    session.closed_at = Some(closed_at);
    session.current_token = None;
    session.token_issued_at = None;
    retired.remove(&session.id);
    info!(session_id = %session.id, reason, "session closed");
}

fn issue_token(
    session: &mut Session,
    retired: &mut VecDeque<String>,
    policy: &AdjudicationPolicy,
    now: Timestamp,
) -> Token {
    let token = Token {
        value: generate_token_value(),
        session_id: session.id,
        issued_at: now,
        expires_at: now.plus(policy.token_ttl()),
    };
    if let Some(previous) = session.current_token.replace(token.clone()) {
        retired.push_back(previous.value);
        while retired.len() > policy.retired_token_memory {
            retired.pop_front();
        }
    }
    session.token_issued_at = Some(now);
    token
}

/// 16 random bytes as 32 lowercase hex characters (128 bits).
fn generate_token_value() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
