//! Error types for classmoji-relay
//!
//! Per-target forwarding failures are not errors: they are reported as
//! `status: "error"` entries in the relay response. These variants only
//! cover startup problems.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Invalid relay configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Outbound HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;
