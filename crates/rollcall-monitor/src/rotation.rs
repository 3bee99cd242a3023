//! QR token rotation.
//!
//! One engine per active session, with two loops:
//!
//! ```text
//! rotation loop ──(every 15 s)──→ authority.regenerate_token()
//!      │ single writer
//!      ▼
//! watch<TokenDisplay> ──→ presenter screen, countdown loop
//!                               │ (every 1 s)
//!                               ▼
//!                         watch<Duration>
//! ```
//!
//! The rotation loop is the only writer of the displayed token, so readers
//! never see two tokens as current at once. A failed rotation keeps the
//! previous token on screen and tries again on the next beat.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rollcall_authority::{Authority, AuthorityError};
use rollcall_cadence::Cadence;
use rollcall_protocol::{SessionId, Token};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::task::OwnedTask;
use crate::MonitorConfig;

// ---------------------------------------------------------------------------
// Display state
// ---------------------------------------------------------------------------

/// What the presenter's screen shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenDisplay {
    /// `None` once the engine has stopped.
    pub token: Option<Token>,
    /// Successful rotations since the engine started.
    pub rotations: u64,
    /// Failed rotations since the last success.
    pub consecutive_failures: u32,
    pub stopped: bool,
}

/// Something the rotation loop wants its owner to know.
#[derive(Debug, Clone, PartialEq)]
pub enum RotationEvent {
    Rotated(Token),
    /// Emitted once per failure streak, when it reaches
    /// `max_silent_failures`.
    Failing {
        consecutive_failures: u32,
        error: AuthorityError,
    },
    /// The authority refused to rotate because the session ended. The
    /// engine has stopped itself.
    SessionClosed,
}

// ---------------------------------------------------------------------------
// Stop signal
// ---------------------------------------------------------------------------

struct Shared {
    stopped: AtomicBool,
    wake: Notify,
    display: watch::Sender<TokenDisplay>,
}

impl Shared {
    /// Returns `true` only for the call that actually stopped the engine.
    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.wake.notify_one();
        self.display.send_modify(|d| {
            d.token = None;
            d.stopped = true;
        });
        true
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Publishes a fresh token unless the engine stopped in the meantime.
    ///
    /// The check runs under the watch's write lock, which `stop` also
    /// takes, so a late answer can never overwrite the cleared display.
    fn publish(&self, token: Token) -> bool {
        self.display.send_if_modified(|d| {
            if self.is_stopped() {
                return false;
            }
            d.token = Some(token);
            d.rotations += 1;
            d.consecutive_failures = 0;
            true
        })
    }
}

/// A cloneable handle that can stop a [`RotationHandle`]'s engine from
/// another task.
#[derive(Clone)]
pub struct RotationStopper(Arc<Shared>);

impl RotationStopper {
    /// See [`RotationHandle::stop`].
    pub fn stop(&self) -> bool {
        self.0.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_stopped()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A running rotation engine. Dropping it aborts both loops.
pub struct RotationHandle {
    session_id: SessionId,
    shared: Arc<Shared>,
    countdown: watch::Receiver<Duration>,
    rotation_task: OwnedTask,
    _countdown_task: OwnedTask,
}

impl RotationHandle {
    /// Starts rotating `initial`, the token the session was opened (or
    /// last rotated) with.
    pub fn spawn<A: Authority>(
        authority: Arc<A>,
        session_id: SessionId,
        initial: Token,
        config: &MonitorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RotationEvent>) {
        let config = config.clone().validated();
        let (display, display_rx) = watch::channel(TokenDisplay {
            token: Some(initial),
            ..Default::default()
        });
        let shared = Arc::new(Shared {
            stopped: AtomicBool::new(false),
            wake: Notify::new(),
            display,
        });
        let (countdown_tx, countdown) =
            watch::channel(config.rotation_period());
        let (events_tx, events) = mpsc::unbounded_channel();

        let rotation_task = OwnedTask::spawn(run_rotation(
            authority,
            session_id,
            shared.clone(),
            config.clone(),
            events_tx,
        ));
        let countdown_task = OwnedTask::spawn(run_countdown(
            display_rx,
            countdown_tx,
            config,
        ));

        info!(%session_id, "token rotation started");
        let handle = Self {
            session_id,
            shared,
            countdown,
            rotation_task,
            _countdown_task: countdown_task,
        };
        (handle, events)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The token on screen right now.
    pub fn current(&self) -> Option<Token> {
        self.shared.display.borrow().token.clone()
    }

    pub fn display(&self) -> watch::Receiver<TokenDisplay> {
        self.shared.display.subscribe()
    }

    /// Time left until the next rotation is due.
    pub fn countdown(&self) -> watch::Receiver<Duration> {
        self.countdown.clone()
    }

    /// Ends rotation and clears the displayed token.
    ///
    /// Idempotent: returns `true` only for the call that actually
    /// stopped the engine, `false` if it was already stopped (by a
    /// previous call or because the session closed).
    pub fn stop(&self) -> bool {
        let stopped = self.shared.stop();
        if stopped {
            info!(session_id = %self.session_id, "token rotation stopped");
        }
        stopped
    }

    pub fn stopper(&self) -> RotationStopper {
        RotationStopper(self.shared.clone())
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Whether the rotation loop task is still alive.
    pub fn is_running(&self) -> bool {
        !self.rotation_task.is_finished()
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

async fn run_rotation<A: Authority>(
    authority: Arc<A>,
    session_id: SessionId,
    shared: Arc<Shared>,
    config: MonitorConfig,
    events: mpsc::UnboundedSender<RotationEvent>,
) {
    let mut cadence = Cadence::new(config.rotation_cadence());
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            _ = shared.wake.notified() => break,
            _ = cadence.wait() => {}
        }
        if shared.is_stopped() {
            break;
        }

        let answer = authority.regenerate_token(session_id).await;
        cadence.record_beat_end();

        match answer {
            Ok(token) => {
                failures = 0;
                if !shared.publish(token.clone()) {
                    debug!(
                        %session_id,
                        "rotation answer arrived after stop, discarded"
                    );
                    break;
                }
                debug!(
                    %session_id,
                    expires_at = %token.expires_at,
                    "token rotated"
                );
                let _ = events.send(RotationEvent::Rotated(token));
            }
            Err(AuthorityError::Closed(_)) => {
                info!(%session_id, "session closed, rotation ends");
                if shared.stop() {
                    let _ = events.send(RotationEvent::SessionClosed);
                }
                break;
            }
            Err(error) => {
                failures += 1;
                shared
                    .display
                    .send_modify(|d| d.consecutive_failures = failures);
                if failures == config.max_silent_failures {
                    warn!(
                        %session_id,
                        consecutive_failures = failures,
                        %error,
                        "token rotation keeps failing, showing previous token"
                    );
                    let _ = events.send(RotationEvent::Failing {
                        consecutive_failures: failures,
                        error,
                    });
                } else {
                    debug!(
                        %session_id,
                        failures,
                        %error,
                        "token rotation failed, will retry"
                    );
                }
            }
        }
    }
}

/// Counts down to the next rotation. Restarts only when a rotation
/// succeeds; after failures it sits at zero until one does.
async fn run_countdown(
    mut display: watch::Receiver<TokenDisplay>,
    remaining: watch::Sender<Duration>,
    config: MonitorConfig,
) {
    let period = config.rotation_period();
    let mut cadence = Cadence::new(config.countdown_cadence());
    let mut deadline = Instant::now() + period;
    let mut seen = display.borrow().rotations;

    loop {
        tokio::select! {
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
                let (rotations, stopped) = {
                    let d = display.borrow_and_update();
                    (d.rotations, d.stopped)
                };
                if stopped {
                    remaining.send_replace(Duration::ZERO);
                    break;
                }
                if rotations != seen {
                    seen = rotations;
                    deadline = Instant::now() + period;
                    cadence.reset();
                    remaining.send_replace(period);
                }
            }
            _ = cadence.wait() => {
                let left = deadline.saturating_duration_since(Instant::now());
                remaining.send_replace(left);
            }
        }
    }
}
