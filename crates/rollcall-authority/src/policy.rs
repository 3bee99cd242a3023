//! Adjudication settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Knobs for how the authority classifies check-ins.
///
/// Deserializes from partial JSON: missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationPolicy {
    /// Validity window of a freshly issued token.
    pub token_ttl_secs: u64,
    /// Extra time a current token is honored after its window, to absorb
    /// the scan-to-submit delay.
    pub token_grace_ms: u64,
    /// Check-ins accepted after `opened_at + late_after_secs` are late.
    pub late_after_secs: u64,
    /// A location fix older than this (authority time) is flagged.
    pub max_fix_age_secs: u64,
    /// A location fix dated further than this into the future is flagged.
    pub max_clock_skew_secs: u64,
    /// Rotated-out tokens remembered per session, so they are reported
    /// as stale rather than unknown.
    pub retired_token_memory: usize,
}

impl Default for AdjudicationPolicy {
    fn default() -> Self {
        Self {
            token_ttl_secs: 15,
            token_grace_ms: 1_000,
            late_after_secs: 600,
            max_fix_age_secs: 60,
            max_clock_skew_secs: 5,
            retired_token_memory: 32,
        }
    }
}

impl AdjudicationPolicy {
    pub const MAX_TOKEN_TTL_SECS: u64 = 3_600;

    /// Clamp out-of-range values so the policy is safe to use.
    ///
    /// - `token_ttl_secs` is kept within `1..=MAX_TOKEN_TTL_SECS`
    /// - `retired_token_memory` is at least 1
    pub fn validated(mut self) -> Self {
        let ttl = self.token_ttl_secs.clamp(1, Self::MAX_TOKEN_TTL_SECS);
        if ttl != self.token_ttl_secs {
            warn!(
                requested = self.token_ttl_secs,
                used = ttl,
                "token ttl out of range, clamping"
            );
            self.token_ttl_secs = ttl;
        }
        self.retired_token_memory = self.retired_token_memory.max(1);
        self
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn token_grace(&self) -> Duration {
        Duration::from_millis(self.token_grace_ms)
    }

    pub fn late_after(&self) -> Duration {
        Duration::from_secs(self.late_after_secs)
    }

    pub fn max_fix_age(&self) -> Duration {
        Duration::from_secs(self.max_fix_age_secs)
    }

    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }
}
