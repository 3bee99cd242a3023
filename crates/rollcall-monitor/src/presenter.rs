//! The presenter's live view of one session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rollcall_authority::{Authority, AuthorityError};
use rollcall_cadence::Cadence;
use rollcall_protocol::{
    AggregateCounts, CheckInRecord, CreateSession, Session, SessionId,
    SessionOverview, SessionStatus, Token,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::task::OwnedTask;
use crate::{
    MonitorConfig, MonitorError, RotationEvent, RotationHandle,
    RotationStopper, TokenDisplay,
};

/// What happened since the presenter last looked.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    Rotated(Token),
    CountChanged(AggregateCounts),
    /// Rotation has failed `max_silent_failures` times in a row. The
    /// previous token is still on screen.
    RotationFailing {
        consecutive_failures: u32,
        error: AuthorityError,
    },
    /// A count poll failed. The snapshot keeps its last good value.
    PollFailed(AuthorityError),
    /// The session ended, by `close()` or by running out its duration.
    /// Reported exactly once.
    Closed(Session),
}

struct Shared<A> {
    authority: Arc<A>,
    session_id: SessionId,
    closed: AtomicBool,
    snapshot: watch::Sender<SessionOverview>,
    rotation: RotationStopper,
    events: mpsc::UnboundedSender<PresenterEvent>,
}

impl<A: Authority> Shared<A> {
    /// Records closure. Whichever path gets here first stops rotation and
    /// reports; every later call is a no-op.
    fn announce_closed(&self, session: Session) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.rotation.stop();
        self.snapshot.send_modify(|s| s.session = session.clone());
        info!(
            session_id = %self.session_id,
            closed_at = ?session.closed_at,
            "session closed"
        );
        let _ = self.events.send(PresenterEvent::Closed(session));
        true
    }

    /// One count poll. Returns `true` once the session is closed.
    async fn poll(&self) -> bool {
        let overview = match self.authority.get(self.session_id).await {
            Ok(overview) => overview,
            Err(AuthorityError::NotFound(_) | AuthorityError::Closed(_)) => {
                let mut session = self.snapshot.borrow().session.clone();
                session.status = SessionStatus::Closed;
                self.announce_closed(session);
                return true;
            }
            Err(e) => {
                debug!(
                    session_id = %self.session_id,
                    error = %e,
                    "count poll failed"
                );
                let _ = self.events.send(PresenterEvent::PollFailed(e));
                return false;
            }
        };

        let changed = self.snapshot.send_if_modified(|s| {
            let changed = s.counts != overview.counts;
            s.counts = overview.counts;
            changed
        });
        if changed {
            debug!(
                session_id = %self.session_id,
                checked_in = overview.counts.checked_in(),
                "live count changed"
            );
            let _ = self
                .events
                .send(PresenterEvent::CountChanged(overview.counts));
        }

        if overview.session.status.is_closed() {
            self.announce_closed(overview.session);
            return true;
        }
        false
    }
}

/// An open session on the presenter's screen: the rotating token, its
/// countdown and the live count.
///
/// Dropping the view aborts every loop it runs.
pub struct PresenterView<A> {
    shared: Arc<Shared<A>>,
    rotation: RotationHandle,
    events: mpsc::UnboundedReceiver<PresenterEvent>,
    _poll_task: OwnedTask,
}

impl<A: Authority> PresenterView<A> {
    /// Creates a session and starts monitoring it.
    pub async fn open(
        authority: Arc<A>,
        params: CreateSession,
        config: &MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let start = authority.create(params).await?;
        let overview = SessionOverview {
            session: start.session,
            counts: AggregateCounts::default(),
        };
        info!(session_id = %overview.session.id, "presenter view opened");
        Ok(Self::start(authority, overview, start.token, config))
    }

    /// Resumes monitoring an already active session, e.g. after the
    /// presenter's screen reloaded. Forces a rotation to obtain a current
    /// token.
    pub async fn attach(
        authority: Arc<A>,
        session_id: SessionId,
        config: &MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let overview = authority.get(session_id).await?;
        if overview.session.status.is_closed() {
            return Err(MonitorError::AlreadyClosed(session_id));
        }
        let token = match authority.regenerate_token(session_id).await {
            Ok(token) => token,
            Err(AuthorityError::Closed(id)) => {
                return Err(MonitorError::AlreadyClosed(id));
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            %session_id,
            checked_in = overview.counts.checked_in(),
            "presenter view attached"
        );
        Ok(Self::start(authority, overview, token, config))
    }

    fn start(
        authority: Arc<A>,
        overview: SessionOverview,
        token: Token,
        config: &MonitorConfig,
    ) -> Self {
        let config = config.clone().validated();
        let session_id = overview.session.id;
        let (rotation, rotation_events) = RotationHandle::spawn(
            authority.clone(),
            session_id,
            token,
            &config,
        );
        let (snapshot, _) = watch::channel(overview);
        let (events_tx, events) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            authority,
            session_id,
            closed: AtomicBool::new(false),
            snapshot,
            rotation: rotation.stopper(),
            events: events_tx,
        });
        let poll_task = OwnedTask::spawn(run_monitor(
            shared.clone(),
            rotation_events,
            Cadence::new(config.presenter_cadence()),
        ));

        Self {
            shared,
            rotation,
            events,
            _poll_task: poll_task,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    /// Session and counts as of the last poll.
    pub fn snapshot(&self) -> watch::Receiver<SessionOverview> {
        self.shared.snapshot.subscribe()
    }

    pub fn counts(&self) -> AggregateCounts {
        self.shared.snapshot.borrow().counts
    }

    /// Subjects checked in so far (present, late or flagged).
    pub fn live_count(&self) -> u32 {
        self.counts().checked_in()
    }

    pub fn token(&self) -> Option<Token> {
        self.rotation.current()
    }

    pub fn token_display(&self) -> watch::Receiver<TokenDisplay> {
        self.rotation.display()
    }

    pub fn countdown(&self) -> watch::Receiver<Duration> {
        self.rotation.countdown()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// The session's check-in records, fetched now.
    pub async fn roster(&self) -> Result<Vec<CheckInRecord>, MonitorError> {
        Ok(self.shared.authority.records(self.shared.session_id).await?)
    }

    /// Waits for the next event.
    pub async fn next_event(&mut self) -> Option<PresenterEvent> {
        self.events.recv().await
    }

    /// Like [`next_event`](Self::next_event) but never waits.
    pub fn try_next_event(&mut self) -> Option<PresenterEvent> {
        self.events.try_recv().ok()
    }

    /// Ends the session through the authority and stops rotation.
    ///
    /// Safe to call more than once and safe to race with expiry: the
    /// `Closed` event is still reported only once.
    pub async fn close(&self) -> Result<Session, MonitorError> {
        let session =
            self.shared.authority.close(self.shared.session_id).await?;
        self.shared.announce_closed(session.clone());
        Ok(session)
    }
}

async fn run_monitor<A: Authority>(
    shared: Arc<Shared<A>>,
    mut rotation_events: mpsc::UnboundedReceiver<RotationEvent>,
    mut cadence: Cadence,
) {
    let mut rotation_open = true;
    loop {
        tokio::select! {
            event = rotation_events.recv(), if rotation_open => {
                match event {
                    Some(RotationEvent::Rotated(token)) => {
                        let _ =
                            shared.events.send(PresenterEvent::Rotated(token));
                    }
                    Some(RotationEvent::Failing {
                        consecutive_failures,
                        error,
                    }) => {
                        let _ = shared.events.send(
                            PresenterEvent::RotationFailing {
                                consecutive_failures,
                                error,
                            },
                        );
                    }
                    // Rotation found out first; confirm with a poll.
                    Some(RotationEvent::SessionClosed) => {
                        if shared.poll().await {
                            break;
                        }
                    }
                    None => rotation_open = false,
                }
            }
            _ = cadence.wait() => {
                let closed = shared.poll().await;
                cadence.record_beat_end();
                if closed {
                    break;
                }
            }
        }
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
    }
    debug!(session_id = %shared.session_id, "presenter monitor ended");
}
