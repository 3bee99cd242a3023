//! Fixed-cadence scheduler for Rollcall.
//!
//! Every periodic activity in the system (token rotation, the rotation
//! countdown, presenter count polling, subject discovery and closure
//! polling) runs on a [`Cadence`]. Each loop owns its own cadence; there
//! is no shared global timer.
//!
//! # Dormant mode
//!
//! A zero period makes the cadence dormant: [`Cadence::wait`] pends
//! forever. A loop configured with a zero poll interval therefore only
//! reacts to its other `select!` branches.
//!
//! # Integration
//!
//! The cadence sits inside a task's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = stop.changed() => break,
//!         beat = cadence.wait() => {
//!             rotate_token().await;
//!             cadence.record_beat_end();
//!         }
//!     }
//! }
//! ```
//!
//! `wait` only mutates state after its sleep completes, so dropping the
//! future inside `select!` loses nothing.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a beat is missed because the previous one ran long
/// or the runtime was busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissedBeatPolicy {
    /// Drop the missed beats and fire on the next slot of the original
    /// grid. A slow authority never causes a burst of back-to-back calls.
    #[default]
    Skip,
    /// Restart the grid from the late beat: the next beat is one full
    /// period after the moment this one actually fired.
    Delay,
}

/// Configuration for a [`Cadence`].
#[derive(Debug, Clone)]
pub struct CadenceConfig {
    /// Time between beats. `Duration::ZERO` means dormant.
    pub period: Duration,
    pub policy: MissedBeatPolicy,
    /// Fire the first beat right away instead of one period from now.
    pub fire_immediately: bool,
    /// Random delay (0..max) added to the first beat so loops started at
    /// the same instant don't all hit the authority together.
    pub initial_jitter: Duration,
    /// Work taking longer than this fraction of the period logs a warning.
    pub overrun_warn_ratio: f64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            period: Duration::ZERO,
            policy: MissedBeatPolicy::default(),
            fire_immediately: false,
            initial_jitter: Duration::ZERO,
            overrun_warn_ratio: 1.0,
        }
    }
}

impl CadenceConfig {
    /// Shortest non-zero period accepted. Smaller values are raised to it.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    pub fn every(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Builder-style toggle for [`fire_immediately`](Self::fire_immediately).
    pub fn immediate(mut self) -> Self {
        self.fire_immediately = true;
        self
    }

    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.initial_jitter = max;
        self
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by [`Cadence::new`]. Rules:
    /// - a non-zero `period` below [`Self::MIN_PERIOD`] is raised to it
    /// - `initial_jitter` is capped at one period
    /// - `overrun_warn_ratio` is clamped to `0.1..=10.0` (NaN becomes 1.0)
    pub fn validated(mut self) -> Self {
        if !self.period.is_zero() && self.period < Self::MIN_PERIOD {
            warn!(
                period_ms = self.period.as_millis() as u64,
                min_ms = Self::MIN_PERIOD.as_millis() as u64,
                "cadence period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        if self.initial_jitter > self.period {
            self.initial_jitter = self.period;
        }
        self.overrun_warn_ratio = if self.overrun_warn_ratio.is_nan() {
            1.0
        } else {
            self.overrun_warn_ratio.clamp(0.1, 10.0)
        };
        self
    }

    pub fn is_dormant(&self) -> bool {
        self.period.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Beat (returned to caller each beat)
// ---------------------------------------------------------------------------

/// Information about one beat, returned by [`Cadence::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    /// Monotonically increasing beat number (starts at 1).
    pub seq: u64,
    /// How long after its scheduled instant the beat actually fired.
    pub late_by: Duration,
    /// Whole beats dropped before this one (always 0 under `Delay`).
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CadenceMetrics {
    pub total_beats: u64,
    pub total_skipped: u64,
    /// Beats whose work took longer than the warning threshold.
    pub total_overruns: u64,
    pub last_work: Duration,
    pub max_work: Duration,
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// A fixed-period scheduler driven by the Tokio clock.
///
/// Uses `tokio::time::Instant` throughout so tests running with paused
/// time see exact, deterministic beats.
pub struct Cadence {
    config: CadenceConfig,
    period: Option<Duration>,
    seq: u64,
    next: Option<Instant>,
    beat_start: Option<Instant>,
    paused: bool,
    metrics: CadenceMetrics,
}

impl Cadence {
    pub fn new(config: CadenceConfig) -> Self {
        let config = config.validated();
        let period = (!config.is_dormant()).then_some(config.period);

        let next = period.map(|p| Self::first_beat(&config, p));

        match period {
            None => debug!("cadence created dormant"),
            Some(p) => debug!(
                period_ms = p.as_millis() as u64,
                policy = ?config.policy,
                immediate = config.fire_immediately,
                "cadence created"
            ),
        }

        Self {
            config,
            period,
            seq: 0,
            next,
            beat_start: None,
            paused: false,
            metrics: CadenceMetrics::default(),
        }
    }

    /// A cadence with the given period and default settings.
    pub fn every(period: Duration) -> Self {
        Self::new(CadenceConfig::every(period))
    }

    fn first_beat(config: &CadenceConfig, period: Duration) -> Instant {
        let jitter = if config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = config.initial_jitter.as_millis().max(1) as u64;
            Duration::from_millis(rand::rng().random_range(0..max))
        };
        let base = if config.fire_immediately {
            Duration::ZERO
        } else {
            period
        };
        Instant::now() + base + jitter
    }

    /// Waits until the next beat is due.
    ///
    /// Dormant or paused cadences pend forever.
    pub async fn wait(&mut self) -> Beat {
        let (next, period) = match (self.next, self.period) {
            (Some(next), Some(period)) if !self.paused => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.seq += 1;
        self.beat_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let behind = (late_by.as_nanos() / period.as_nanos()) as u64;

        let (following, skipped) = match self.config.policy {
            MissedBeatPolicy::Skip => {
                let slots = u32::try_from(behind + 1).unwrap_or(u32::MAX);
                (next + period * slots, behind)
            }
            MissedBeatPolicy::Delay => (now + period, 0),
        };
        self.next = Some(following);

        if skipped > 0 {
            debug!(
                beat = self.seq,
                skipped,
                late_ms = late_by.as_millis() as u64,
                "cadence fell behind, skipping missed beats"
            );
        }

        self.metrics.total_beats += 1;
        self.metrics.total_skipped += skipped;
        trace!(beat = self.seq, skipped, "beat");

        Beat {
            seq: self.seq,
            late_by,
            skipped,
        }
    }

    /// Records that the work for the current beat has finished.
    ///
    /// Optional. Without it, overrun warnings and work metrics stay idle.
    pub fn record_beat_end(&mut self) {
        let (Some(start), Some(period)) = (self.beat_start.take(), self.period)
        else {
            return;
        };
        let work = start.elapsed();

        self.metrics.last_work = work;
        self.metrics.max_work = self.metrics.max_work.max(work);

        let ratio = work.as_secs_f64() / period.as_secs_f64();
        if ratio >= self.config.overrun_warn_ratio {
            self.metrics.total_overruns += 1;
            warn!(
                beat = self.seq,
                work_ms = work.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "beat work exceeded its period"
            );
        }
    }

    /// Restarts the grid: the next beat fires one full period from now.
    ///
    /// Used after an out-of-band run (e.g. a manual refresh) so the
    /// scheduled beat doesn't repeat the same work moments later.
    pub fn reset(&mut self) {
        if let Some(period) = self.period {
            self.next = Some(Instant::now() + period);
        }
    }

    /// Stops beats until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(beat = self.seq, "cadence paused");
        }
    }

    /// Resumes after a pause, one full period from now, so time spent
    /// paused never produces a burst.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.reset();
            debug!(beat = self.seq, "cadence resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_dormant(&self) -> bool {
        self.period.is_none()
    }

    /// Beats fired so far.
    pub fn beats(&self) -> u64 {
        self.seq
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Instant of the next scheduled beat, if any.
    pub fn next_beat(&self) -> Option<Instant> {
        self.next
    }

    pub fn metrics(&self) -> &CadenceMetrics {
        &self.metrics
    }
}
