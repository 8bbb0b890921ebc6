//! Error types for the council and governor.

use thiserror::Error;

/// Result type alias for council operations.
pub type Result<T> = std::result::Result<T, CouncilError>;

/// Errors raised by voting oracles and governor configuration.
///
/// A denied or vetoed request is not an error; it is a
/// [`GovernanceDecision`](crate::GovernanceDecision) with `approved == false`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CouncilError {
    /// Governor or council configuration is invalid.
    #[error("invalid governance configuration: {0}")]
    Config(String),

    /// No open vote with this id.
    #[error("vote '{0}' not found")]
    UnknownVote(String),

    /// The oracle could not be reached or failed internally.
    #[error("voting oracle unavailable: {0}")]
    Oracle(String),
}
