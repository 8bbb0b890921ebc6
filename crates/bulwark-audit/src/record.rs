//! The audit record and its action taxonomy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trust::TrustLevel;

/// Every auditable transition or decision in the core.
///
/// The serialized names are stable and dotted (`component.event`) so that
/// downstream log processors can filter by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "sanitizer.suspicious_content")]
    SuspiciousContent,
    #[serde(rename = "sanitizer.rate_limited")]
    RateLimited,
    #[serde(rename = "sanitizer.failed")]
    SanitizationFailed,

    #[serde(rename = "circuit.opened")]
    CircuitOpened,
    #[serde(rename = "circuit.half_opened")]
    CircuitHalfOpened,
    #[serde(rename = "circuit.closed")]
    CircuitClosed,
    #[serde(rename = "circuit.reset")]
    CircuitReset,

    #[serde(rename = "governance.approved")]
    GovernanceApproved,
    #[serde(rename = "governance.denied")]
    GovernanceDenied,
    #[serde(rename = "governance.vetoed")]
    GovernanceVetoed,
    #[serde(rename = "governance.emergency_budget")]
    EmergencyBudgetVote,

    #[serde(rename = "token.issued")]
    TokenIssued,
    #[serde(rename = "token.denied")]
    TokenDenied,
    #[serde(rename = "token.verified")]
    TokenVerified,
    #[serde(rename = "token.rejected")]
    TokenRejected,
    #[serde(rename = "token.used")]
    TokenUsed,

    #[serde(rename = "tool.registered")]
    ToolRegistered,
    #[serde(rename = "tool.unregistered")]
    ToolUnregistered,
    #[serde(rename = "tool.handler_bound")]
    ToolHandlerBound,
    #[serde(rename = "tool.executed")]
    ToolExecuted,
    #[serde(rename = "tool.rejected")]
    ToolRejected,
    #[serde(rename = "tool.aborted")]
    ToolAborted,
}

impl AuditAction {
    /// The stable dotted name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SuspiciousContent => "sanitizer.suspicious_content",
            AuditAction::RateLimited => "sanitizer.rate_limited",
            AuditAction::SanitizationFailed => "sanitizer.failed",
            AuditAction::CircuitOpened => "circuit.opened",
            AuditAction::CircuitHalfOpened => "circuit.half_opened",
            AuditAction::CircuitClosed => "circuit.closed",
            AuditAction::CircuitReset => "circuit.reset",
            AuditAction::GovernanceApproved => "governance.approved",
            AuditAction::GovernanceDenied => "governance.denied",
            AuditAction::GovernanceVetoed => "governance.vetoed",
            AuditAction::EmergencyBudgetVote => "governance.emergency_budget",
            AuditAction::TokenIssued => "token.issued",
            AuditAction::TokenDenied => "token.denied",
            AuditAction::TokenVerified => "token.verified",
            AuditAction::TokenRejected => "token.rejected",
            AuditAction::TokenUsed => "token.used",
            AuditAction::ToolRegistered => "tool.registered",
            AuditAction::ToolUnregistered => "tool.unregistered",
            AuditAction::ToolHandlerBound => "tool.handler_bound",
            AuditAction::ToolExecuted => "tool.executed",
            AuditAction::ToolRejected => "tool.rejected",
            AuditAction::ToolAborted => "tool.aborted",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the audit trail.
///
/// Records are immutable once built. `details` is free-form JSON owned by
/// the emitting component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// What happened.
    pub action: AuditAction,
    /// Who caused it (agent id, sender id, provider name or `system`).
    pub actor_id: String,
    /// The actor's trust level, when the component knows it.
    pub actor_trust_level: Option<TrustLevel>,
    /// Component-specific payload.
    pub details: serde_json::Value,
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Builds a record stamped with the current time.
    pub fn new(
        action: AuditAction,
        actor_id: impl Into<String>,
        actor_trust_level: Option<TrustLevel>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action,
            actor_id: actor_id.into(),
            actor_trust_level,
            details,
            timestamp: Utc::now(),
        }
    }

    /// Builds a record attributed to the core itself.
    pub fn system(action: AuditAction, details: serde_json::Value) -> Self {
        Self::new(action, "system", None, details)
    }
}
