//! Log output for permission round trips.
//!
//! Delegate, coordinator and host events (attach, prompt, outcome, detach)
//! are emitted as `tracing` events carrying the screen handle and permission
//! set as fields. This module installs the subscriber that renders them,
//! filtered per crate from the `[logging]` settings unless `RUST_LOG` is set.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Crates whose events are enabled at the configured level.
const LOG_TARGETS: [&str; 2] = ["permwait_core", "permwait_cli"];

/// Install the global subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset. With `log_json` each
/// event is one JSON object per line. Output goes to stderr so it never mixes
/// with the report printed on stdout.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Install the subscriber from resolved [`LoggingConfig`] settings.
pub fn init_from_config(logging: &LoggingConfig) {
    init_tracing(&default_filter(&logging.level), logging.json);
}

fn default_filter(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}
