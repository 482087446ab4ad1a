//! Tracing/logging initialization for Linky binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the env-filter: `RUST_LOG` wins, otherwise `default_filter`.
fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- directive used when `RUST_LOG` is unset or invalid
///   (e.g. `"linky_notifier=info"`).
/// * `log_json` -- emit one JSON object per line instead of the
///   human-readable format.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str, log_json: bool) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    }
}
