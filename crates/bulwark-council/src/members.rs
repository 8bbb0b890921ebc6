//! Built-in council members: security, resource and finance reviewers.
//!
//! Each reviewer covers one veto domain so the in-process council reaches
//! the same conclusions a human council would on clear-cut requests.

use bulwark_audit::TrustLevel;

use crate::ballot::{Ballot, VoteRequest};

/// A voting member of a [`LocalCouncil`](crate::LocalCouncil).
///
/// Members are pure functions of the request; they never block.
pub trait CouncilMember: Send + Sync {
    /// Name recorded on the member's ballots.
    fn name(&self) -> &str;

    /// Domain this member reviews.
    fn domain(&self) -> &str;

    /// Voting weight.
    fn weight(&self) -> f64 {
        1.0
    }

    /// Reviews a request and returns a ballot.
    fn review(&self, request: &VoteRequest) -> Ballot;
}

/// Rejects security-sensitive requests from insufficiently trusted callers.
#[derive(Debug, Clone)]
pub struct SecurityReviewer {
    trusted_threshold: TrustLevel,
}

impl Default for SecurityReviewer {
    fn default() -> Self {
        Self::new(TrustLevel::Trusted)
    }
}

impl SecurityReviewer {
    pub fn new(trusted_threshold: TrustLevel) -> Self {
        Self { trusted_threshold }
    }
}

impl CouncilMember for SecurityReviewer {
    fn name(&self) -> &str {
        "security-reviewer"
    }

    fn domain(&self) -> &str {
        "security"
    }

    fn weight(&self) -> f64 {
        1.5
    }

    fn review(&self, request: &VoteRequest) -> Ballot {
        if request.security_sensitive && request.trust_level < self.trusted_threshold {
            Ballot::reject(
                self.name(),
                self.weight(),
                format!(
                    "security-sensitive request from {} caller (requires {})",
                    request.trust_level, self.trusted_threshold
                ),
            )
        } else {
            Ballot::approve(self.name(), self.weight(), "no security concerns")
        }
    }
}

/// Rejects requests whose estimated token volume is excessive.
#[derive(Debug, Clone)]
pub struct ResourceReviewer {
    token_ceiling: u64,
}

impl Default for ResourceReviewer {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl ResourceReviewer {
    pub fn new(token_ceiling: u64) -> Self {
        Self { token_ceiling }
    }
}

impl CouncilMember for ResourceReviewer {
    fn name(&self) -> &str {
        "resource-reviewer"
    }

    fn domain(&self) -> &str {
        "resource"
    }

    fn review(&self, request: &VoteRequest) -> Ballot {
        if request.estimated_tokens > self.token_ceiling {
            Ballot::reject(
                self.name(),
                self.weight(),
                format!(
                    "{} estimated tokens exceeds ceiling of {}",
                    request.estimated_tokens, self.token_ceiling
                ),
            )
        } else {
            Ballot::approve(self.name(), self.weight(), "within resource budget")
        }
    }
}

/// Rejects spend above the large-transaction ceiling and abstains on
/// requests with no cost attached.
#[derive(Debug, Clone)]
pub struct FinanceReviewer {
    transaction_ceiling: f64,
}

impl Default for FinanceReviewer {
    fn default() -> Self {
        Self::new(5.00)
    }
}

impl FinanceReviewer {
    pub fn new(transaction_ceiling: f64) -> Self {
        Self { transaction_ceiling }
    }
}

impl CouncilMember for FinanceReviewer {
    fn name(&self) -> &str {
        "finance-reviewer"
    }

    fn domain(&self) -> &str {
        "financial"
    }

    fn review(&self, request: &VoteRequest) -> Ballot {
        let cost = request.estimated_cost;
        if !cost.is_finite() || cost > self.transaction_ceiling {
            Ballot::reject(
                self.name(),
                self.weight(),
                format!("cost ${cost:.2} exceeds ceiling ${:.2}", self.transaction_ceiling),
            )
        } else if cost <= 0.0 {
            Ballot::abstain(self.name(), "no spend attached")
        } else {
            Ballot::approve(self.name(), self.weight(), format!("cost ${cost:.2} within budget"))
        }
    }
}

/// The default three-member council.
pub fn default_members() -> Vec<Box<dyn CouncilMember>> {
    vec![
        Box::new(SecurityReviewer::default()),
        Box::new(ResourceReviewer::default()),
        Box::new(FinanceReviewer::default()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::Decision;

    fn request(cost: f64, trust: TrustLevel, sensitive: bool, tokens: u64) -> VoteRequest {
        VoteRequest {
            topic: "test".into(),
            requester_id: "agent".into(),
            trust_level: trust,
            estimated_cost: cost,
            model: "model-x".into(),
            security_sensitive: sensitive,
            estimated_tokens: tokens,
            required_ratio: 0.67,
        }
    }

    #[test]
    fn test_security_reviewer() {
        let reviewer = SecurityReviewer::default();
        let ballot = reviewer.review(&request(1.0, TrustLevel::Standard, true, 10));
        assert_eq!(ballot.decision, Decision::Reject);
        assert_eq!(ballot.weight, 1.5);

        let ballot = reviewer.review(&request(1.0, TrustLevel::Trusted, true, 10));
        assert_eq!(ballot.decision, Decision::Approve);

        let ballot = reviewer.review(&request(1.0, TrustLevel::Untrusted, false, 10));
        assert_eq!(ballot.decision, Decision::Approve);
    }

    #[test]
    fn test_resource_reviewer() {
        let reviewer = ResourceReviewer::new(100);
        assert_eq!(
            reviewer.review(&request(1.0, TrustLevel::Standard, false, 101)).decision,
            Decision::Reject
        );
        assert_eq!(
            reviewer.review(&request(1.0, TrustLevel::Standard, false, 100)).decision,
            Decision::Approve
        );
    }

    #[test]
    fn test_finance_reviewer() {
        let reviewer = FinanceReviewer::default();
        assert_eq!(
            reviewer.review(&request(7.0, TrustLevel::Standard, false, 1)).decision,
            Decision::Reject
        );
        assert_eq!(
            reviewer.review(&request(f64::NAN, TrustLevel::Standard, false, 1)).decision,
            Decision::Reject
        );
        assert_eq!(
            reviewer.review(&request(0.0, TrustLevel::Standard, false, 1)).decision,
            Decision::Abstain
        );
        assert_eq!(
            reviewer.review(&request(1.5, TrustLevel::Standard, false, 1)).decision,
            Decision::Approve
        );
    }

    #[test]
    fn test_default_members_cover_each_domain() {
        let domains: Vec<String> = default_members().iter().map(|m| m.domain().to_string()).collect();
        assert_eq!(domains, vec!["security", "resource", "financial"]);
    }
}
