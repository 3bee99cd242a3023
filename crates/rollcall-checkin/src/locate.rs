//! The geolocation boundary.
//!
//! Rollcall doesn't read GPS hardware itself. The device platform
//! implements [`Locator`]; the flow only asks for one fresh fix.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rollcall_authority::{Clock, SystemClock};
use rollcall_protocol::{Coordinates, LocationReading};

/// How a fix must be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Ask for GPS-grade accuracy rather than network positioning.
    pub high_accuracy: bool,
    /// Oldest cached fix acceptable. Zero means a fresh fix every time.
    pub maximum_age: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Why a fix could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    /// The platform gave up on its own before the flow's deadline.
    #[error("location timed out after {0:?}")]
    Timeout(Duration),
}

/// A source of device location fixes.
pub trait Locator: Send + Sync + 'static {
    fn locate(
        &self,
        options: &PositionOptions,
    ) -> impl Future<Output = Result<LocationReading, LocateError>> + Send;
}

/// A [`Locator`] that always reports the same place (or the same failure).
///
/// Fixes are stamped with the current time when requested, so they never
/// look stale to the authority. An optional delay simulates a slow
/// receiver.
#[derive(Debug)]
pub struct StaticLocator {
    fix: Result<(Coordinates, f64), LocateError>,
    delay: Duration,
    clock: SystemClock,
    calls: AtomicUsize,
}

impl StaticLocator {
    /// Always reports `coords` with the given accuracy.
    pub fn at(coords: Coordinates, accuracy_m: f64) -> Self {
        Self::with_outcome(Ok((coords, accuracy_m)))
    }

    /// Always fails with `err`.
    pub fn failing(err: LocateError) -> Self {
        Self::with_outcome(Err(err))
    }

    fn with_outcome(fix: Result<(Coordinates, f64), LocateError>) -> Self {
        Self {
            fix,
            delay: Duration::ZERO,
            clock: SystemClock::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// How many fixes have been requested.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Locator for StaticLocator {
    async fn locate(
        &self,
        _options: &PositionOptions,
    ) -> Result<LocationReading, LocateError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let (coords, accuracy_m) = self.fix.clone()?;
        Ok(LocationReading {
            coords,
            accuracy_m,
            captured_at: self.clock.now(),
        })
    }
}
