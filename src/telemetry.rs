//! Telemetry bootstrap
//!
//! Structured logging setup for binaries and long test runs. The library
//! itself only emits `tracing` events; installing a subscriber is the
//! embedder's choice.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global subscriber honoring `RUST_LOG`, defaulting to `info`.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Same as [`init`] but emitting one JSON object per event, for log
/// pipelines.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
