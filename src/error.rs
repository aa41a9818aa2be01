//! Error types for Platoon Coordinator
//!
//! Recoverable conditions (degraded clusters, undeliverable messages) are
//! surfaced as typed events on the simulation output log, not as errors;
//! internal invariant regressions panic. The variants here cover the
//! fail-fast boundary: malformed inputs and configuration mistakes.

use thiserror::Error;

/// Main error type for Platoon Coordinator
#[derive(Error, Debug)]
pub enum Error {
    /// Input invariant violations (NaN coordinates, negative speeds,
    /// duplicate node ids). Rejected at the boundary, never reach internals.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        node_id: Option<u64>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        field: Option<String>,
    },
}

impl Error {
    /// Shorthand for an input-boundary rejection tied to a node
    pub fn invalid_input(message: impl Into<String>, node_id: Option<u64>) -> Self {
        Error::InvalidInput {
            message: message.into(),
            node_id,
        }
    }

    /// Shorthand for a configuration rejection
    pub fn config(message: impl Into<String>, field: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
