//! Time sources for adjudication.
//!
//! Only the authority's clock decides lateness and token freshness.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rollcall_protocol::Timestamp;
use tokio::time::Instant;

/// Source of "now" for the authority.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time, read once at construction and then advanced by the
/// Tokio clock.
///
/// Anchoring to the Tokio clock keeps the authority consistent with
/// every cadence in the process: under paused test time, sessions expire
/// exactly when the test advances past their duration.
#[derive(Debug, Clone)]
pub struct SystemClock {
    wall_anchor: Timestamp,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let ms = u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX);
        Self {
            wall_anchor: Timestamp(ms),
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        self.wall_anchor.plus(self.anchor.elapsed())
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start.0)),
        }
    }

    pub fn set(&self, to: Timestamp) {
        self.now_ms.store(to.0, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.load(Ordering::SeqCst))
    }
}
