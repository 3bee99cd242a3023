//! Application configuration, loaded from JSON.
//!
//! Every section is optional; whatever is missing takes its default:
//!
//! ```json
//! {
//!   "server":  { "bind": "0.0.0.0:9400", "idle_timeout_secs": 120 },
//!   "policy":  { "token_ttl_secs": 15, "late_after_secs": 600 },
//!   "monitor": { "rotation_period_secs": 15, "subject_poll_secs": 30 },
//!   "checkin": { "location_timeout_secs": 15 },
//!   "log_filter": "info,rollcall_monitor=debug"
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use rollcall_authority::AdjudicationPolicy;
use rollcall_checkin::CheckInConfig;
use rollcall_monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Errors reading or parsing a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Hosting settings for [`AuthorityServer`](crate::AuthorityServer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Connections silent for this long are closed.
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9400".to_string(),
            idle_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Clamp the idle timeout into `1..=3600` seconds.
    pub fn validated(mut self) -> Self {
        self.idle_timeout_secs = self.idle_timeout_secs.clamp(1, 3600);
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Everything a Rollcall deployment can tune.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RollcallConfig {
    pub server: ServerConfig,
    pub policy: AdjudicationPolicy,
    pub monitor: MonitorConfig,
    pub checkin: CheckInConfig,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl RollcallConfig {
    /// Parses a JSON document and clamps every section.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Reads and parses a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_json_str(&json)
    }

    /// Clamps every section, then ties rotation to the token lifetime.
    ///
    /// A code on screen must still be accepted until the next one
    /// replaces it, so the rotation period is capped at `token_ttl_secs`
    /// whenever it would outlast the token and its grace.
    pub fn validated(self) -> Self {
        let policy = self.policy.validated();
        let mut monitor = self.monitor.validated();

        let lifetime = policy.token_ttl() + policy.token_grace();
        if monitor.rotation_period() > lifetime {
            warn!(
                rotation_period_secs = monitor.rotation_period_secs,
                token_ttl_secs = policy.token_ttl_secs,
                "codes would expire on screen, rotating at token ttl"
            );
            monitor.rotation_period_secs = policy.token_ttl_secs;
            monitor = monitor.validated();
        }

        Self {
            server: self.server.validated(),
            policy,
            monitor,
            checkin: self.checkin.validated(),
            log_filter: self.log_filter,
        }
    }

    /// The filter to start logging with.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(crate::logging::DEFAULT_FILTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_all_defaults() {
        let config = RollcallConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RollcallConfig::default().validated());
        assert_eq!(config.server.bind, "127.0.0.1:9400");
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = RollcallConfig::from_json_str(
            r#"{
                "server": { "idle_timeout_secs": 120 },
                "monitor": { "subject_poll_secs": 5 },
                "log_filter": "debug"
            }"#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9400");
        assert_eq!(config.server.idle_timeout(), Duration::from_secs(120));
        assert_eq!(config.monitor.subject_poll_secs, 5);
        assert_eq!(config.monitor.rotation_period_secs, 15);
        assert_eq!(config.policy, AdjudicationPolicy::default());
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = RollcallConfig::from_json_str(
            r#"{
                "server": { "idle_timeout_secs": 0 },
                "checkin": { "location_timeout_secs": 999 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.idle_timeout_secs, 1);
        assert_eq!(config.checkin.location_timeout_secs, 120);
    }

    #[test]
    fn test_rotation_slower_than_token_ttl_is_capped() {
        let config = RollcallConfig::from_json_str(
            r#"{
                "policy": { "token_ttl_secs": 15 },
                "monitor": { "rotation_period_secs": 30 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.monitor.rotation_period_secs, 15);
    }

    #[test]
    fn test_rotation_within_token_ttl_is_kept() {
        let config = RollcallConfig::from_json_str(
            r#"{
                "policy": { "token_ttl_secs": 60 },
                "monitor": { "rotation_period_secs": 20 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.monitor.rotation_period_secs, 20);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = RollcallConfig::from_json_str("{ server: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err =
            RollcallConfig::load("/nonexistent/rollcall.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/rollcall.json"));
    }
}
