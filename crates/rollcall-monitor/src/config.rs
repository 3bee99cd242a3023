//! Monitor timing configuration.

use std::time::Duration;

use rollcall_cadence::CadenceConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Periods for every background loop a view runs.
///
/// A zero poll interval makes that loop dormant: it only runs on demand
/// (`refresh_now`) or never. Rotation cannot be disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between token rotations. Should not exceed the
    /// authority's token ttl, or codes expire while still on screen.
    pub rotation_period_secs: u64,

    /// Resolution of the rotation countdown.
    pub countdown_step_ms: u64,

    /// Presenter view: how often live counts are refreshed.
    pub presenter_poll_secs: u64,

    /// Subject view: how often the active session list is reloaded.
    pub subject_poll_secs: u64,

    /// Subject view: how often each tracked open session is checked for
    /// closure.
    pub closure_poll_secs: u64,

    /// Consecutive rotation failures absorbed before one is reported.
    pub max_silent_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rotation_period_secs: 15,
            countdown_step_ms: 1000,
            presenter_poll_secs: 10,
            subject_poll_secs: 30,
            closure_poll_secs: 10,
            max_silent_failures: 3,
        }
    }
}

impl MonitorConfig {
    /// Clamp out-of-range values.
    ///
    /// - `rotation_period_secs` into `1..=3600`
    /// - `countdown_step_ms` into `100..=` one rotation period
    /// - `max_silent_failures` to at least 1
    pub fn validated(mut self) -> Self {
        let rotation = self.rotation_period_secs.clamp(1, 3600);
        if rotation != self.rotation_period_secs {
            warn!(
                requested = self.rotation_period_secs,
                used = rotation,
                "rotation period out of range, clamping"
            );
            self.rotation_period_secs = rotation;
        }
        self.countdown_step_ms =
            self.countdown_step_ms.clamp(100, rotation * 1000);
        self.max_silent_failures = self.max_silent_failures.max(1);
        self
    }

    pub fn rotation_period(&self) -> Duration {
        Duration::from_secs(self.rotation_period_secs)
    }

    pub fn countdown_step(&self) -> Duration {
        Duration::from_millis(self.countdown_step_ms)
    }

    /// Cadence for the token rotation loop.
    pub(crate) fn rotation_cadence(&self) -> CadenceConfig {
        CadenceConfig::every(self.rotation_period())
    }

    pub(crate) fn countdown_cadence(&self) -> CadenceConfig {
        CadenceConfig::every(self.countdown_step())
    }

    /// Presenter count polling. The first poll comes one period in, the
    /// snapshot is already fresh from `open`/`attach`.
    pub(crate) fn presenter_cadence(&self) -> CadenceConfig {
        CadenceConfig::every(Duration::from_secs(self.presenter_poll_secs))
    }

    /// Subject discovery fires at once so a new view has cards quickly.
    pub(crate) fn discovery_cadence(&self) -> CadenceConfig {
        CadenceConfig::every(Duration::from_secs(self.subject_poll_secs))
            .immediate()
    }

    pub(crate) fn closure_cadence(&self) -> CadenceConfig {
        let period = Duration::from_secs(self.closure_poll_secs);
        CadenceConfig::every(period).with_jitter(period / 10)
    }
}
