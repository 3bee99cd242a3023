//! The subject's view: which sessions are open for them, and what they can
//! do in each.
//!
//! Two loops share one card map:
//!
//! - **discovery** reloads the subject's active sessions (every 30 s, or
//!   at once on [`SubjectView::refresh_now`])
//! - **closure** checks every tracked open session (every 10 s) and, when
//!   one has ended, swaps its check-in affordance for the final status

use std::collections::BTreeMap;
use std::sync::Arc;

use rollcall_authority::{Authority, AuthorityError};
use rollcall_cadence::Cadence;
use rollcall_protocol::{
    ActiveSessionEntry, CheckInStatus, Session, SessionId, SessionStatus,
    SubjectId,
};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info};

use crate::task::OwnedTask;
use crate::MonitorConfig;

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

/// What the subject can do with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordance {
    /// Open and no accepted record yet (a rejected attempt still counts
    /// as "not yet").
    CheckIn,
    /// Open and already recorded.
    Recorded(CheckInStatus),
    /// Ended. Terminal.
    Closed { final_status: Option<CheckInStatus> },
}

impl Affordance {
    fn from_entry(entry: &ActiveSessionEntry) -> Self {
        match entry.checked_in {
            Some(status) if status.is_accepted() => Self::Recorded(status),
            _ => Self::CheckIn,
        }
    }

    pub fn can_check_in(&self) -> bool {
        matches!(self, Self::CheckIn)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// One session on the subject's screen.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCard {
    /// Redacted: subjects never see token material.
    pub session: Session,
    pub affordance: Affordance,
}

pub type Cards = BTreeMap<SessionId, SessionCard>;

/// What changed on the subject's screen.
#[derive(Debug, Clone, PartialEq)]
pub enum SubjectEvent {
    /// A session appeared for the first time.
    Discovered(SessionCard),
    /// A tracked session ended. Reported once per session.
    Closed {
        session_id: SessionId,
        final_status: Option<CheckInStatus>,
    },
    /// Loading the session list or a session's state failed. Cards keep
    /// their last known state.
    LoadFailed(AuthorityError),
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

struct Shared<A> {
    authority: Arc<A>,
    subject_id: SubjectId,
    cards: watch::Sender<Cards>,
    refresh: Notify,
    events: mpsc::UnboundedSender<SubjectEvent>,
}

/// Keeps a subject's session cards current.
///
/// Dropping the view aborts both loops.
pub struct SubjectView<A> {
    shared: Arc<Shared<A>>,
    events: mpsc::UnboundedReceiver<SubjectEvent>,
    _discovery: OwnedTask,
    _closure: OwnedTask,
}

impl<A: Authority> SubjectView<A> {
    /// Starts both loops. Discovery runs immediately.
    pub fn spawn(
        authority: Arc<A>,
        subject_id: SubjectId,
        config: &MonitorConfig,
    ) -> Self {
        let config = config.clone().validated();
        let (cards, _) = watch::channel(Cards::new());
        let (events_tx, events) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            authority,
            subject_id,
            cards,
            refresh: Notify::new(),
            events: events_tx,
        });

        let discovery = OwnedTask::spawn(run_discovery(
            shared.clone(),
            Cadence::new(config.discovery_cadence()),
        ));
        let closure = OwnedTask::spawn(run_closure(
            shared.clone(),
            Cadence::new(config.closure_cadence()),
        ));
        info!(%subject_id, "subject view started");

        Self {
            shared,
            events,
            _discovery: discovery,
            _closure: closure,
        }
    }

    pub fn subject_id(&self) -> SubjectId {
        self.shared.subject_id
    }

    pub fn cards(&self) -> watch::Receiver<Cards> {
        self.shared.cards.subscribe()
    }

    pub fn card(&self, session_id: SessionId) -> Option<SessionCard> {
        self.shared.cards.borrow().get(&session_id).cloned()
    }

    /// Reloads the session list now instead of at the next beat, e.g.
    /// right after a check-in succeeded.
    pub fn refresh_now(&self) {
        self.shared.refresh.notify_one();
    }

    pub async fn next_event(&mut self) -> Option<SubjectEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SubjectEvent> {
        self.events.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

impl<A: Authority> Shared<A> {
    async fn discover(&self) {
        let listed =
            self.authority.list_active_for_subject(self.subject_id).await;
        let entries = match listed {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    subject_id = %self.subject_id,
                    error = %e,
                    "session list load failed"
                );
                let _ = self.events.send(SubjectEvent::LoadFailed(e));
                return;
            }
        };

        let mut discovered = Vec::new();
        self.cards.send_if_modified(|cards| {
            let mut modified = false;
            for entry in &entries {
                let card = SessionCard {
                    session: entry.session.clone(),
                    affordance: Affordance::from_entry(entry),
                };
                match cards.get_mut(&entry.session.id) {
                    None => {
                        discovered.push(card.clone());
                        cards.insert(entry.session.id, card);
                        modified = true;
                    }
                    Some(existing) if existing.affordance.is_closed() => {}
                    Some(existing) => {
                        if *existing != card {
                            *existing = card;
                            modified = true;
                        }
                    }
                }
            }
            modified
        });

        for card in discovered {
            debug!(
                subject_id = %self.subject_id,
                session_id = %card.session.id,
                "session discovered"
            );
            let _ = self.events.send(SubjectEvent::Discovered(card));
        }
    }

    async fn check_closures(&self) {
        let open: Vec<SessionId> = self
            .cards
            .borrow()
            .values()
            .filter(|card| !card.affordance.is_closed())
            .map(|card| card.session.id)
            .collect();

        for session_id in open {
            let ended = match self.authority.get(session_id).await {
                Ok(overview) if overview.session.status.is_closed() => {
                    Some(overview.session)
                }
                Ok(_) => None,
                Err(AuthorityError::NotFound(_)) => self
                    .card_session(session_id)
                    .map(|mut session| {
                        session.status = SessionStatus::Closed;
                        session
                    }),
                Err(e) => {
                    debug!(%session_id, error = %e, "closure check failed");
                    let _ = self.events.send(SubjectEvent::LoadFailed(e));
                    continue;
                }
            };
            if let Some(session) = ended {
                self.mark_closed(session).await;
            }
        }
    }

    fn card_session(&self, session_id: SessionId) -> Option<Session> {
        self.cards
            .borrow()
            .get(&session_id)
            .map(|card| card.session.clone())
    }

    /// Fetches the final status and flips the card. Only the first caller
    /// for a session reports it.
    async fn mark_closed(&self, session: Session) {
        let session_id = session.id;
        let final_status = match self
            .authority
            .record_for(session_id, self.subject_id)
            .await
        {
            Ok(record) => record.map(|r| r.status),
            Err(e) => {
                // Retry on the next beat rather than show a wrong status.
                debug!(%session_id, error = %e, "final status load failed");
                let _ = self.events.send(SubjectEvent::LoadFailed(e));
                return;
            }
        };

        let flipped = self.cards.send_if_modified(|cards| {
            match cards.get_mut(&session_id) {
                Some(card) if !card.affordance.is_closed() => {
                    card.session = session;
                    card.affordance = Affordance::Closed { final_status };
                    true
                }
                _ => false,
            }
        });
        if flipped {
            info!(
                subject_id = %self.subject_id,
                %session_id,
                final_status = ?final_status,
                "session closed"
            );
            let _ = self.events.send(SubjectEvent::Closed {
                session_id,
                final_status,
            });
        }
    }
}

async fn run_discovery<A: Authority>(
    shared: Arc<Shared<A>>,
    mut cadence: Cadence,
) {
    loop {
        tokio::select! {
            _ = shared.refresh.notified() => {
                shared.discover().await;
                cadence.reset();
            }
            _ = cadence.wait() => {
                shared.discover().await;
                cadence.record_beat_end();
            }
        }
    }
}

async fn run_closure<A: Authority>(
    shared: Arc<Shared<A>>,
    mut cadence: Cadence,
) {
    loop {
        cadence.wait().await;
        shared.check_closures().await;
        cadence.record_beat_end();
    }
}
