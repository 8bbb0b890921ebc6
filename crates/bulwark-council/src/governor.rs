//! Cost-tiered spend governance with domain vetoes.
//!
//! # Tiers
//!
//! | Cost (USD)            | Mechanism             | Ratio | Oracle |
//! |-----------------------|-----------------------|-------|--------|
//! | `< auto_approve`      | `auto_approved`       | -     | no     |
//! | `< low`               | `simple_majority`     | 0.51  | no     |
//! | `< moderate`          | `weighted_majority`   | 0.60  | no     |
//! | `< high`              | `supermajority`       | 0.67  | yes    |
//! | `>= high`             | `super_supermajority` | 0.80  | yes    |
//!
//! The two majority tiers are predictions: low-risk spend never waits on
//! the council. Vetoes are checked before any tier logic and always deny.

use std::sync::Arc;

use bulwark_audit::{AuditAction, AuditRecord, AuditSink, TrustLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::ballot::VoteRequest;
use crate::error::{CouncilError, Result};
use crate::oracle::{VoteOutcome, VotingOracle};

/// Cost boundaries between voting tiers, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceThresholds {
    pub auto_approve: f64,
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
}

impl Default for GovernanceThresholds {
    fn default() -> Self {
        Self {
            auto_approve: 0.01,
            low: 0.10,
            moderate: 0.50,
            high: 1.00,
        }
    }
}

impl GovernanceThresholds {
    /// Rejects negative, non-finite or non-ascending boundaries.
    pub fn validate(&self) -> Result<()> {
        let bounds = [self.auto_approve, self.low, self.moderate, self.high];
        if bounds.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(CouncilError::Config(
                "governance thresholds must be finite and non-negative".into(),
            ));
        }
        if !bounds.windows(2).all(|w| w[0] < w[1]) {
            return Err(CouncilError::Config(format!(
                "governance thresholds must be strictly ascending, got {bounds:?}"
            )));
        }
        Ok(())
    }
}

/// Approval ratio each voting tier requires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingRatios {
    pub simple_majority: f64,
    pub weighted_majority: f64,
    pub supermajority: f64,
    pub super_supermajority: f64,
}

impl Default for VotingRatios {
    fn default() -> Self {
        Self {
            simple_majority: 0.51,
            weighted_majority: 0.60,
            supermajority: 0.67,
            super_supermajority: 0.80,
        }
    }
}

impl VotingRatios {
    pub fn validate(&self) -> Result<()> {
        let ratios = [
            self.simple_majority,
            self.weighted_majority,
            self.supermajority,
            self.super_supermajority,
        ];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(CouncilError::Config("voting ratios must be within 0.0..=1.0".into()));
        }
        if !ratios.windows(2).all(|w| w[0] < w[1]) {
            return Err(CouncilError::Config(format!(
                "voting ratios must be strictly ascending, got {ratios:?}"
            )));
        }
        Ok(())
    }
}

/// Veto ceilings and the agent names that exercise them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VetoConfig {
    /// Minimum trust for security-sensitive requests.
    pub trusted_threshold: TrustLevel,
    /// Maximum estimated token volume of request content.
    pub resource_token_ceiling: u64,
    /// Maximum cost of a single transaction, in USD.
    pub large_transaction_ceiling: f64,
    pub security_agent: String,
    pub resource_agent: String,
    pub financial_agent: String,
}

impl Default for VetoConfig {
    fn default() -> Self {
        Self {
            trusted_threshold: TrustLevel::Trusted,
            resource_token_ceiling: 100_000,
            large_transaction_ceiling: 5.00,
            security_agent: "security-council".into(),
            resource_agent: "resource-council".into(),
            financial_agent: "financial-council".into(),
        }
    }
}

/// Policy governor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub thresholds: GovernanceThresholds,
    pub ratios: VotingRatios,
    pub vetoes: VetoConfig,
    /// Spend-to-cap ratio above which emergency votes deny.
    pub emergency_utilization_ceiling: f64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            thresholds: GovernanceThresholds::default(),
            ratios: VotingRatios::default(),
            vetoes: VetoConfig::default(),
            emergency_utilization_ceiling: 0.95,
        }
    }
}

impl GovernorConfig {
    pub fn with_thresholds(mut self, thresholds: GovernanceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_ratios(mut self, ratios: VotingRatios) -> Self {
        self.ratios = ratios;
        self
    }

    pub fn with_vetoes(mut self, vetoes: VetoConfig) -> Self {
        self.vetoes = vetoes;
        self
    }

    pub fn with_emergency_utilization_ceiling(mut self, ceiling: f64) -> Self {
        self.emergency_utilization_ceiling = ceiling;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.ratios.validate()?;
        let ceiling = self.vetoes.large_transaction_ceiling;
        if !ceiling.is_finite() || ceiling <= 0.0 {
            return Err(CouncilError::Config(
                "large_transaction_ceiling must be positive".into(),
            ));
        }
        if self.vetoes.resource_token_ceiling == 0 {
            return Err(CouncilError::Config("resource_token_ceiling must be > 0".into()));
        }
        let utilization = self.emergency_utilization_ceiling;
        if utilization.is_nan() || utilization <= 0.0 || utilization > 1.0 {
            return Err(CouncilError::Config(
                "emergency_utilization_ceiling must be within (0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

/// A costed action awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceRequest {
    pub requester_id: String,
    pub trust_level: TrustLevel,
    /// Prompt or payload the spend is for; only its size is inspected.
    pub content: String,
    pub security_sensitive: bool,
    pub description: Option<String>,
}

impl GovernanceRequest {
    pub fn new(requester_id: impl Into<String>, trust_level: TrustLevel, content: impl Into<String>) -> Self {
        Self {
            requester_id: requester_id.into(),
            trust_level,
            content: content.into(),
            security_sensitive: false,
            description: None,
        }
    }

    pub fn with_security_sensitive(mut self, sensitive: bool) -> Self {
        self.security_sensitive = sensitive;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Approximate token count, four bytes per token rounded up.
    pub fn estimated_tokens(&self) -> u64 {
        (self.content.len() as u64).div_ceil(4)
    }
}

/// How a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingMechanism {
    AutoApproved,
    SimpleMajority,
    WeightedMajority,
    Supermajority,
    SuperSupermajority,
    EmergencyBudget,
}

impl VotingMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotingMechanism::AutoApproved => "auto_approved",
            VotingMechanism::SimpleMajority => "simple_majority",
            VotingMechanism::WeightedMajority => "weighted_majority",
            VotingMechanism::Supermajority => "supermajority",
            VotingMechanism::SuperSupermajority => "super_supermajority",
            VotingMechanism::EmergencyBudget => "emergency_budget",
        }
    }

    /// Ratio this mechanism needs; zero for mechanisms that do not vote.
    pub fn required_ratio(&self, ratios: &VotingRatios) -> f64 {
        match self {
            VotingMechanism::AutoApproved | VotingMechanism::EmergencyBudget => 0.0,
            VotingMechanism::SimpleMajority => ratios.simple_majority,
            VotingMechanism::WeightedMajority => ratios.weighted_majority,
            VotingMechanism::Supermajority => ratios.supermajority,
            VotingMechanism::SuperSupermajority => ratios.super_supermajority,
        }
    }

    /// Whether the external council is consulted.
    pub fn uses_oracle(&self) -> bool {
        matches!(
            self,
            VotingMechanism::Supermajority | VotingMechanism::SuperSupermajority
        )
    }
}

impl std::fmt::Display for VotingMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain that exercised a veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoDomain {
    Security,
    Resource,
    Financial,
}

impl VetoDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            VetoDomain::Security => "security",
            VetoDomain::Resource => "resource",
            VetoDomain::Financial => "financial",
        }
    }
}

/// Outcome of a governance request. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceDecision {
    pub approved: bool,
    pub mechanism: VotingMechanism,
    pub required_ratio: f64,
    pub veto_exercised: bool,
    pub vetoing_domain: Option<VetoDomain>,
    pub vetoing_agent: Option<String>,
    pub reason: String,
    /// Present only when the council held a full vote.
    pub vote_id: Option<String>,
    pub cost: f64,
    pub model: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl GovernanceDecision {
    fn new(mechanism: VotingMechanism, ratios: &VotingRatios, cost: f64, model: Option<&str>) -> Self {
        Self {
            approved: false,
            mechanism,
            required_ratio: mechanism.required_ratio(ratios),
            veto_exercised: false,
            vetoing_domain: None,
            vetoing_agent: None,
            reason: String::new(),
            vote_id: None,
            cost,
            model: model.map(str::to_string),
            decided_at: Utc::now(),
        }
    }

    fn approve(mut self, reason: impl Into<String>) -> Self {
        self.approved = true;
        self.reason = reason.into();
        self
    }

    fn deny(mut self, reason: impl Into<String>) -> Self {
        self.approved = false;
        self.reason = reason.into();
        self
    }

    fn veto(mut self, domain: Option<VetoDomain>, agent: impl Into<String>, reason: impl Into<String>) -> Self {
        self.approved = false;
        self.veto_exercised = true;
        self.vetoing_domain = domain;
        self.vetoing_agent = Some(agent.into());
        self.reason = reason.into();
        self
    }
}

/// Decides whether costed AI actions may proceed.
///
/// Holds no mutable state: every decision reads only the request and the
/// immutable tier table, so calls never contend with each other.
pub struct PolicyGovernor {
    config: GovernorConfig,
    oracle: Arc<dyn VotingOracle>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for PolicyGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyGovernor").field("config", &self.config).finish_non_exhaustive()
    }
}

impl PolicyGovernor {
    /// Builds a governor after validating `config`.
    pub fn new(
        config: GovernorConfig,
        oracle: Arc<dyn VotingOracle>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, oracle, audit })
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn oracle(&self) -> &Arc<dyn VotingOracle> {
        &self.oracle
    }

    /// Mechanism the tier table assigns to `cost`.
    ///
    /// Non-finite costs fall through to the strictest tier.
    pub fn mechanism_for(&self, cost: f64) -> VotingMechanism {
        let t = &self.config.thresholds;
        if cost < t.auto_approve {
            VotingMechanism::AutoApproved
        } else if cost < t.low {
            VotingMechanism::SimpleMajority
        } else if cost < t.moderate {
            VotingMechanism::WeightedMajority
        } else if cost < t.high {
            VotingMechanism::Supermajority
        } else {
            VotingMechanism::SuperSupermajority
        }
    }

    /// Returns the first veto `request` triggers, if any.
    pub fn check_vetoes(&self, request: &GovernanceRequest, cost: f64) -> Option<(VetoDomain, String)> {
        let v = &self.config.vetoes;
        if request.security_sensitive && request.trust_level < v.trusted_threshold {
            return Some((
                VetoDomain::Security,
                format!(
                    "security-sensitive request from {} requester; requires {}",
                    request.trust_level, v.trusted_threshold
                ),
            ));
        }
        let tokens = request.estimated_tokens();
        if tokens > v.resource_token_ceiling {
            return Some((
                VetoDomain::Resource,
                format!(
                    "estimated {tokens} tokens exceeds ceiling of {}",
                    v.resource_token_ceiling
                ),
            ));
        }
        if cost > v.large_transaction_ceiling {
            return Some((
                VetoDomain::Financial,
                format!(
                    "cost ${cost:.2} exceeds large-transaction ceiling ${:.2}",
                    v.large_transaction_ceiling
                ),
            ));
        }
        None
    }

    fn veto_agent(&self, domain: VetoDomain) -> &str {
        let v = &self.config.vetoes;
        match domain {
            VetoDomain::Security => &v.security_agent,
            VetoDomain::Resource => &v.resource_agent,
            VetoDomain::Financial => &v.financial_agent,
        }
    }

    fn domain_of_agent(&self, agent: &str) -> Option<VetoDomain> {
        [VetoDomain::Security, VetoDomain::Resource, VetoDomain::Financial]
            .into_iter()
            .find(|d| self.veto_agent(*d) == agent)
    }

    /// Decides whether `request` may spend `cost` on `model`.
    ///
    /// Infallible: oracle failures deny the request.
    pub async fn request_approval(
        &self,
        request: &GovernanceRequest,
        cost: f64,
        model: &str,
    ) -> GovernanceDecision {
        let mechanism = self.mechanism_for(cost);
        let base = GovernanceDecision::new(mechanism, &self.config.ratios, cost, Some(model));

        let decision = if !cost.is_finite() || cost < 0.0 {
            base.deny(format!("invalid cost estimate: {cost}"))
        } else if let Some((domain, reason)) = self.check_vetoes(request, cost) {
            let agent = self.veto_agent(domain).to_string();
            base.veto(Some(domain), agent, reason)
        } else {
            self.decide_tier(request, base, model).await
        };

        self.audit_decision(request, &decision);
        decision
    }

    async fn decide_tier(
        &self,
        request: &GovernanceRequest,
        base: GovernanceDecision,
        model: &str,
    ) -> GovernanceDecision {
        let mechanism = base.mechanism;
        let cost = base.cost;
        match mechanism {
            VotingMechanism::AutoApproved => base.approve(format!(
                "cost ${cost:.4} below auto-approve floor ${:.2}",
                self.config.thresholds.auto_approve
            )),
            VotingMechanism::SimpleMajority | VotingMechanism::WeightedMajority => {
                base.approve(format!("predicted {mechanism} approval for ${cost:.2}"))
            }
            VotingMechanism::Supermajority | VotingMechanism::SuperSupermajority => {
                self.hold_vote(request, base, model).await
            }
            // Budget overruns go through `emergency_budget_vote` only.
            VotingMechanism::EmergencyBudget => {
                base.deny("emergency budget is not a spend tier")
            }
        }
    }

    async fn hold_vote(
        &self,
        request: &GovernanceRequest,
        base: GovernanceDecision,
        model: &str,
    ) -> GovernanceDecision {
        let vote = VoteRequest {
            topic: request
                .description
                .clone()
                .unwrap_or_else(|| format!("{} spend on {model}", base.mechanism)),
            requester_id: request.requester_id.clone(),
            trust_level: request.trust_level,
            estimated_cost: base.cost,
            model: model.to_string(),
            security_sensitive: request.security_sensitive,
            estimated_tokens: request.estimated_tokens(),
            required_ratio: base.required_ratio,
        };

        match self.run_vote(vote).await {
            Ok(outcome) => self.apply_outcome(base, outcome),
            Err(e) => {
                warn!(requester = %request.requester_id, error = %e, "council vote failed, denying");
                base.deny(format!("council unavailable: {e}"))
            }
        }
    }

    async fn run_vote(&self, vote: VoteRequest) -> Result<VoteOutcome> {
        let ticket = self.oracle.create_vote(vote).await?;
        self.oracle.close_vote(&ticket.vote_id).await
    }

    fn apply_outcome(&self, base: GovernanceDecision, outcome: VoteOutcome) -> GovernanceDecision {
        let ratio = outcome.tally.approval_ratio();
        let mut decision = if let Some(agent) = outcome.vetoed_by.clone() {
            let reason = outcome
                .veto_reason
                .clone()
                .unwrap_or_else(|| "vetoed by council".to_string());
            base.veto(self.domain_of_agent(&agent), agent, reason)
        } else if outcome.approved {
            base.approve(format!(
                "{} reached: {ratio:.2} >= {:.2}",
                tally_summary(&outcome),
                outcome.required_ratio
            ))
        } else {
            base.deny(format!(
                "{} not reached: {ratio:.2} < {:.2} ({:?})",
                tally_summary(&outcome),
                outcome.required_ratio,
                outcome.result
            ))
        };
        decision.vote_id = Some(outcome.vote_id);
        decision
    }

    /// Fast-path decision on spending past a budget cap.
    ///
    /// Denies above the utilization ceiling, when `cap` is not positive, and
    /// on any non-finite or negative input.
    pub fn emergency_budget_vote(&self, spent: f64, cap: f64) -> GovernanceDecision {
        let base = GovernanceDecision::new(
            VotingMechanism::EmergencyBudget,
            &self.config.ratios,
            spent,
            None,
        );
        let ceiling = self.config.emergency_utilization_ceiling;

        let decision = if !spent.is_finite() || !cap.is_finite() || spent < 0.0 {
            base.deny(format!("invalid budget figures: spent={spent} cap={cap}"))
        } else if cap <= 0.0 {
            base.deny("no budget cap configured")
        } else {
            let utilization = spent / cap;
            if utilization > ceiling {
                base.deny(format!(
                    "utilization {:.1}% exceeds {:.1}%",
                    utilization * 100.0,
                    ceiling * 100.0
                ))
            } else {
                base.approve(format!("utilization {:.1}% within budget", utilization * 100.0))
            }
        };

        if decision.approved {
            info!(spent, cap, "emergency budget vote approved");
        } else {
            warn!(spent, cap, reason = %decision.reason, "emergency budget vote denied");
        }
        self.audit.record(AuditRecord::system(
            AuditAction::EmergencyBudgetVote,
            json!({
                "approved": decision.approved,
                "spent": spent,
                "cap": cap,
                "utilization_ceiling": ceiling,
                "reason": decision.reason,
            }),
        ));
        decision
    }

    fn audit_decision(&self, request: &GovernanceRequest, decision: &GovernanceDecision) {
        let action = if decision.veto_exercised {
            warn!(
                requester = %request.requester_id,
                domain = decision.vetoing_domain.map(|d| d.as_str()).unwrap_or("unknown"),
                reason = %decision.reason,
                "governance veto"
            );
            AuditAction::GovernanceVetoed
        } else if decision.approved {
            info!(
                requester = %request.requester_id,
                mechanism = %decision.mechanism,
                cost = decision.cost,
                "governance approved"
            );
            AuditAction::GovernanceApproved
        } else {
            warn!(
                requester = %request.requester_id,
                mechanism = %decision.mechanism,
                reason = %decision.reason,
                "governance denied"
            );
            AuditAction::GovernanceDenied
        };

        self.audit.record(AuditRecord::new(
            action,
            request.requester_id.clone(),
            Some(request.trust_level),
            json!({
                "mechanism": decision.mechanism,
                "cost": decision.cost,
                "model": decision.model,
                "required_ratio": decision.required_ratio,
                "vote_id": decision.vote_id,
                "veto_exercised": decision.veto_exercised,
                "vetoing_domain": decision.vetoing_domain,
                "vetoing_agent": decision.vetoing_agent,
                "reason": decision.reason,
            }),
        ));
    }
}

fn tally_summary(outcome: &VoteOutcome) -> String {
    format!("{} approvals / {} rejections", outcome.tally.approvals, outcome.tally.rejections)
}
