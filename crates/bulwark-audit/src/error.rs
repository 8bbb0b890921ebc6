//! Error types for audit sinks.

use thiserror::Error;

/// Errors raised while constructing an audit sink.
///
/// Writing a record is infallible from the caller's point of view; these
/// errors only surface when a sink is opened.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The audit log file could not be opened or created.
    #[error("audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A trust level string did not name a known level.
    #[error("unknown trust level: '{0}'")]
    UnknownTrustLevel(String),
}
