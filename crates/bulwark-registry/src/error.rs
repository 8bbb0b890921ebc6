//! Error types for the tool registry.

use thiserror::Error;

use crate::models::PermissionTier;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors raised by the registry.
///
/// Parameter validation failures are not errors; they are reported in a
/// [`ValidationReport`](crate::ValidationReport).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A capability with this id is already registered.
    ///
    /// Capabilities are append-only; unregister first to redefine.
    #[error("capability '{0}' is already registered")]
    AlreadyRegistered(String),

    /// No capability with this id exists.
    #[error("capability '{0}' not found")]
    NotFound(String),

    /// The handler's tier differs from the definition's permission tier.
    #[error("handler tier {handler:?} does not match capability '{id}' tier {declared:?}")]
    TierMismatch {
        id: String,
        declared: PermissionTier,
        handler: PermissionTier,
    },

    /// A real handler is already bound; only placeholders can be replaced.
    #[error("capability '{0}' already has a bound handler")]
    HandlerAlreadyBound(String),

    /// The definition itself is malformed.
    #[error("invalid capability definition '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },

    /// A manifest could not be read.
    #[error("manifest I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON manifest could not be parsed.
    #[error("invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    /// A TOML manifest could not be parsed.
    #[error("invalid TOML manifest: {0}")]
    Toml(#[from] toml::de::Error),

    /// Manifest file extension is neither `.json` nor `.toml`.
    #[error("unsupported manifest format: {0}")]
    UnsupportedFormat(String),
}
