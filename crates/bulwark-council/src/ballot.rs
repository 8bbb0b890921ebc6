//! Ballots and the requests they answer.

use std::fmt;

use bulwark_audit::TrustLevel;
use serde::{Deserialize, Serialize};

/// A member's decision on a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    /// Does not count toward either side or toward quorum.
    Abstain,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approve => write!(f, "APPROVE"),
            Decision::Reject => write!(f, "REJECT"),
            Decision::Abstain => write!(f, "ABSTAIN"),
        }
    }
}

/// A weighted vote cast by one council member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub member: String,
    pub decision: Decision,
    pub weight: f64,
    pub reasoning: String,
}

impl Ballot {
    pub fn new(
        member: impl Into<String>,
        decision: Decision,
        weight: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            member: member.into(),
            decision,
            weight: weight.max(0.0),
            reasoning: reasoning.into(),
        }
    }

    pub fn approve(member: impl Into<String>, weight: f64, reasoning: impl Into<String>) -> Self {
        Self::new(member, Decision::Approve, weight, reasoning)
    }

    pub fn reject(member: impl Into<String>, weight: f64, reasoning: impl Into<String>) -> Self {
        Self::new(member, Decision::Reject, weight, reasoning)
    }

    pub fn abstain(member: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self::new(member, Decision::Abstain, 0.0, reasoning)
    }
}

/// What a council is asked to vote on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Short description of the action being paid for.
    pub topic: String,
    pub requester_id: String,
    pub trust_level: TrustLevel,
    /// Estimated spend in USD.
    pub estimated_cost: f64,
    pub model: String,
    pub security_sensitive: bool,
    /// Estimated token volume of the request content.
    pub estimated_tokens: u64,
    /// Weighted approval ratio needed to pass.
    pub required_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_weight_clamped() {
        let ballot = Ballot::approve("m", -2.0, "r");
        assert_eq!(ballot.weight, 0.0);
    }

    #[test]
    fn test_abstain_has_no_weight() {
        let ballot = Ballot::abstain("m", "no opinion");
        assert_eq!(ballot.decision, Decision::Abstain);
        assert_eq!(ballot.weight, 0.0);
        assert_eq!(ballot.decision.to_string(), "ABSTAIN");
    }
}
