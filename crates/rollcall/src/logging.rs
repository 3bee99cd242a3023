//! Log output for binaries and demos.
//!
//! Library crates only emit `tracing` events. Installing a subscriber is
//! left to the application, through [`init`].

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a formatting subscriber.
///
/// `RUST_LOG`, when set and valid, wins over `filter`. Returns `false` if
/// a global subscriber was already installed, so calling this twice (or
/// from several tests) is harmless.
pub fn init(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));
    fmt().with_env_filter(filter).with_target(true).try_init().is_ok()
}
