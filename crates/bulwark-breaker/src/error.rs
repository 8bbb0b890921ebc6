//! Error types for the circuit breaker.

use thiserror::Error;

/// Result type alias for breaker operations.
pub type Result<T> = std::result::Result<T, BreakerError>;

/// Errors raised by breakers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BreakerError {
    /// A configuration value is out of range.
    #[error("invalid breaker configuration: {0}")]
    InvalidConfig(String),

    /// The breaker rejected the call without running it.
    #[error("circuit open for provider '{provider}'")]
    Open {
        /// Provider the breaker protects
        provider: String,
    },
}
