//! Tracing subscriber configuration for namelink nodes.
//!
//! Log levels follow these conventions:
//! - ERROR: unrecoverable failures (fatal prefix registration)
//! - WARN: recovered errors, transmit failures, faces going down
//! - INFO: protocol events (neighbor status changes, reconvergence runs)
//! - DEBUG: dropped packets, per-tick state changes
//! - TRACE: per-packet detail, cost query breakdowns

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// The `RUST_LOG` environment variable takes precedence; `default_level` is
/// the fallback and comes from the `[logging] level` config option.
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initialize the tracing subscriber with JSON output.
///
/// Useful for structured logging in containerized environments.
/// Activated by setting `RUST_LOG_FORMAT=json`.
pub fn init_json(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .init();
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
