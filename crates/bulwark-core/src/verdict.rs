//! Verdicts for model calls.

use std::fmt;

use bulwark_council::{GovernanceDecision, VetoDomain, VotingMechanism};
use serde::{Deserialize, Serialize};

/// Whether a model call may go ahead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    /// The provider is healthy and governance approved the spend.
    Allow {
        /// The approving decision.
        decision: GovernanceDecision,
    },

    /// Do not call the provider.
    Block {
        /// Why the call was blocked.
        reason: BlockReason,
    },
}

impl Verdict {
    pub fn allow(decision: GovernanceDecision) -> Self {
        Self::Allow { decision }
    }

    pub fn block(reason: BlockReason) -> Self {
        Self::Block { reason }
    }

    /// Maps a governance decision to a verdict.
    pub fn from_decision(decision: GovernanceDecision) -> Self {
        if decision.approved {
            return Self::allow(decision);
        }
        let reason = if decision.veto_exercised {
            BlockReason::Vetoed {
                domain: decision.vetoing_domain,
                agent: decision.vetoing_agent.unwrap_or_default(),
                reason: decision.reason,
            }
        } else {
            BlockReason::GovernanceDenied {
                mechanism: decision.mechanism,
                reason: decision.reason,
                vote_id: decision.vote_id,
            }
        };
        Self::block(reason)
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Block { .. })
    }

    /// The approving decision, if allowed.
    pub fn decision(&self) -> Option<&GovernanceDecision> {
        match self {
            Self::Allow { decision } => Some(decision),
            Self::Block { .. } => None,
        }
    }
}

/// Reasons for blocking a model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockReason {
    /// The provider's circuit is open.
    ProviderUnavailable { provider: String },

    /// The vote failed or the request was malformed.
    GovernanceDenied {
        mechanism: VotingMechanism,
        reason: String,
        vote_id: Option<String>,
    },

    /// A domain veto overrode the vote.
    Vetoed {
        domain: Option<VetoDomain>,
        agent: String,
        reason: String,
    },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::ProviderUnavailable { provider } => {
                write!(f, "provider '{provider}' unavailable (circuit open)")
            }
            BlockReason::GovernanceDenied { mechanism, reason, .. } => {
                write!(f, "denied by {mechanism}: {reason}")
            }
            BlockReason::Vetoed { agent, reason, .. } => write!(f, "vetoed by {agent}: {reason}"),
        }
    }
}
