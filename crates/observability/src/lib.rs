//! `jobq-observability` — tracing/logging initialization.
//!
//! The queue library itself only emits `tracing` events; installing a
//! subscriber is the embedding process's job. These helpers cover the two
//! common cases: JSON logs for services and captured output for tests.

use tracing_subscriber::EnvFilter;

/// Install a JSON subscriber for a worker or client process.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .try_init();
}

/// Install a compact subscriber whose output is captured per test.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .compact()
        .try_init();
}
