//! Error, denial and rejection types for the policy engine.
//!
//! Only [`PolicyError`] is an error in the operational sense. A
//! [`TokenDenial`] (issuance refused) and a [`TokenRejection`] (token not
//! accepted at execution time) are ordinary authorization outcomes.

use bulwark_audit::TrustLevel;
use bulwark_registry::PermissionTier;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for policy engine operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Configuration and storage failures.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy configuration is invalid.
    #[error("invalid policy configuration: {0}")]
    Config(String),

    /// A parameter deny rule does not compile.
    #[error("deny rule for '{tool_id}.{parameter}' has an invalid pattern: {source}")]
    InvalidPattern {
        tool_id: String,
        parameter: String,
        #[source]
        source: regex::Error,
    },

    /// The signing key could not be decoded.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// The used-token ledger failed.
    #[error("token ledger error: {0}")]
    Ledger(#[from] sled::Error),

    /// A token could not be encoded for signing.
    #[error("token encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Why a token was not issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenDenial {
    #[error("agent '{0}' is not on the allowlist")]
    AgentNotAllowed(String),

    #[error("tool '{0}' is not registered")]
    UnknownTool(String),

    #[error("{tier} tools require {required} trust, caller has {actual}")]
    InsufficientTrust {
        tier: PermissionTier,
        required: TrustLevel,
        actual: TrustLevel,
    },

    #[error("parameters rejected: {0}")]
    InvalidParameters(String),

    #[error("parameter '{parameter}' denied by policy: {reason}")]
    ParameterDenied { parameter: String, reason: String },

    #[error("council rejected destructive invocation: {0}")]
    CouncilRejected(String),

    #[error("council unavailable: {0}")]
    CouncilUnavailable(String),

    #[error("token could not be minted: {0}")]
    Internal(String),
}

impl TokenDenial {
    /// Stable snake_case code used in audit records.
    pub fn code(&self) -> &'static str {
        match self {
            TokenDenial::AgentNotAllowed(_) => "agent_not_allowed",
            TokenDenial::UnknownTool(_) => "unknown_tool",
            TokenDenial::InsufficientTrust { .. } => "insufficient_trust",
            TokenDenial::InvalidParameters(_) => "invalid_parameters",
            TokenDenial::ParameterDenied { .. } => "parameter_denied",
            TokenDenial::CouncilRejected(_) => "council_rejected",
            TokenDenial::CouncilUnavailable(_) => "council_unavailable",
            TokenDenial::Internal(_) => "internal",
        }
    }
}

/// Why a presented token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("token signature is invalid")]
    BadSignature,

    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("token has already been used")]
    AlreadyUsed,

    #[error("presented parameters differ from the parameters the token was issued for")]
    ParameterMismatch,

    #[error("token ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The capability's tier now demands more trust than the token carries.
    #[error("{tier} tools now require {required} trust, token carries {actual}")]
    TierRaised {
        tier: PermissionTier,
        required: TrustLevel,
        actual: TrustLevel,
    },
}

impl TokenRejection {
    /// Stable snake_case code used in audit records.
    pub fn code(&self) -> &'static str {
        match self {
            TokenRejection::BadSignature => "bad_signature",
            TokenRejection::Expired(_) => "expired",
            TokenRejection::AlreadyUsed => "already_used",
            TokenRejection::ParameterMismatch => "parameter_mismatch",
            TokenRejection::LedgerUnavailable(_) => "ledger_unavailable",
            TokenRejection::TierRaised { .. } => "tier_raised",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_messages() {
        let denial = TokenDenial::InsufficientTrust {
            tier: PermissionTier::Destructive,
            required: TrustLevel::Elevated,
            actual: TrustLevel::Standard,
        };
        assert_eq!(
            denial.to_string(),
            "destructive tools require elevated trust, caller has standard"
        );
        assert_eq!(denial.code(), "insufficient_trust");
    }

    #[test]
    fn test_rejection_codes() {
        assert_eq!(TokenRejection::AlreadyUsed.code(), "already_used");
        assert_eq!(TokenRejection::ParameterMismatch.code(), "parameter_mismatch");
    }
}
