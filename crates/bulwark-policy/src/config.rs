//! Policy engine configuration.

use std::time::Duration;

use bulwark_audit::TrustLevel;
use bulwark_registry::PermissionTier;
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, Result};

/// Default token lifetime in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60;

/// Minimum trust required per permission tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTrust {
    pub read: TrustLevel,
    pub write: TrustLevel,
    pub destructive: TrustLevel,
}

impl Default for TierTrust {
    fn default() -> Self {
        Self {
            read: TrustLevel::Restricted,
            write: TrustLevel::Standard,
            destructive: TrustLevel::Elevated,
        }
    }
}

impl TierTrust {
    pub fn for_tier(&self, tier: PermissionTier) -> TrustLevel {
        match tier {
            PermissionTier::Read => self.read,
            PermissionTier::Write => self.write,
            PermissionTier::Destructive => self.destructive,
        }
    }
}

/// Refuses tokens whose parameter matches a pattern.
///
/// `tool_id` of `"*"` applies the rule to every tool. Non-string values are
/// matched against their canonical JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRule {
    pub tool_id: String,
    pub parameter: String,
    pub pattern: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl DenyRule {
    pub fn new(
        tool_id: impl Into<String>,
        parameter: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            parameter: parameter.into(),
            pattern: pattern.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn applies_to(&self, tool_id: &str) -> bool {
        self.tool_id == "*" || self.tool_id == tool_id
    }
}

/// Configuration for [`PolicyEngine`](crate::PolicyEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Agents allowed to request tokens. Empty admits every agent.
    pub allowed_agents: Vec<String>,
    pub min_trust: TierTrust,
    pub token_ttl_secs: u64,
    pub deny_rules: Vec<DenyRule>,
    /// Require a council vote for destructive-tier tokens when an oracle
    /// is attached.
    pub council_for_destructive: bool,
    /// Approval ratio for that vote.
    pub council_ratio: f64,
    /// Hex-encoded HMAC key. A random key is generated when absent.
    pub signing_key: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_agents: Vec::new(),
            min_trust: TierTrust::default(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            deny_rules: Vec::new(),
            council_for_destructive: false,
            council_ratio: 0.67,
            signing_key: None,
        }
    }
}

impl PolicyConfig {
    pub fn with_allowed_agent(mut self, agent: impl Into<String>) -> Self {
        self.allowed_agents.push(agent.into());
        self
    }

    pub fn with_min_trust(mut self, min_trust: TierTrust) -> Self {
        self.min_trust = min_trust;
        self
    }

    pub fn with_token_ttl_secs(mut self, secs: u64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    pub fn with_deny_rule(mut self, rule: DenyRule) -> Self {
        self.deny_rules.push(rule);
        self
    }

    pub fn with_council_for_destructive(mut self, enabled: bool) -> Self {
        self.council_for_destructive = enabled;
        self
    }

    pub fn with_signing_key(mut self, hex_key: impl Into<String>) -> Self {
        self.signing_key = Some(hex_key.into());
        self
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn is_agent_allowed(&self, agent_id: &str) -> bool {
        self.allowed_agents.is_empty() || self.allowed_agents.iter().any(|a| a == agent_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token_ttl_secs == 0 {
            return Err(PolicyError::Config("token_ttl_secs must be > 0".into()));
        }
        if self.council_ratio.is_nan() || self.council_ratio <= 0.0 || self.council_ratio > 1.0 {
            return Err(PolicyError::Config(
                "council_ratio must be within (0.0, 1.0]".into(),
            ));
        }
        if let Some(rule) = self
            .deny_rules
            .iter()
            .find(|r| r.tool_id.is_empty() || r.parameter.is_empty())
        {
            return Err(PolicyError::Config(format!(
                "deny rule '{}' needs both tool_id and parameter",
                rule.pattern
            )));
        }
        Ok(())
    }
}
