//! Token issuance and verification.

use std::sync::Arc;

use bulwark_audit::{AuditAction, AuditRecord, AuditSink, TrustLevel};
use bulwark_council::{VoteRequest, VotingOracle};
use bulwark_registry::{canonical_eq, canonical_json, fingerprint, PermissionTier, ToolRegistry};
use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{DenyRule, PolicyConfig};
use crate::error::{PolicyError, Result, TokenDenial, TokenRejection};
use crate::ledger::TokenLedger;
use crate::token::{CapabilityToken, TokenSigner};

/// A request for permission to invoke one tool with fixed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRequest {
    pub agent_id: String,
    pub trust_level: TrustLevel,
    pub tool_id: String,
    pub parameters: Value,
}

impl TokenRequest {
    pub fn new(
        agent_id: impl Into<String>,
        trust_level: TrustLevel,
        tool_id: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            trust_level,
            tool_id: tool_id.into(),
            parameters,
        }
    }
}

/// The seam between token issuance and tool execution.
pub trait TokenVerifier: Send + Sync {
    /// Checks signature, expiry, prior use and parameter binding.
    fn verify_token(
        &self,
        token: &CapabilityToken,
        parameters: &Value,
    ) -> std::result::Result<(), TokenRejection>;

    /// Consumes the token. `true` only for the first call; later calls are
    /// no-ops that never re-authorize.
    fn mark_token_used(&self, token: &CapabilityToken) -> bool;
}

struct CompiledRule {
    rule: DenyRule,
    regex: Regex,
}

/// Issues single-use capability tokens and verifies them at execution time.
pub struct PolicyEngine {
    config: PolicyConfig,
    signer: TokenSigner,
    ledger: TokenLedger,
    registry: Arc<ToolRegistry>,
    rules: Vec<CompiledRule>,
    oracle: Option<Arc<dyn VotingOracle>>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("config", &self.config)
            .field("signer", &self.signer)
            .field("ledger", &self.ledger)
            .field("oracle", &self.oracle.is_some())
            .finish_non_exhaustive()
    }
}

/// Absent parameters bind as an empty object.
fn normalize(parameters: &Value) -> Value {
    match parameters {
        Value::Null => json!({}),
        other => other.clone(),
    }
}

impl PolicyEngine {
    pub fn new(
        config: PolicyConfig,
        registry: Arc<ToolRegistry>,
        ledger: TokenLedger,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;

        let signer = match &config.signing_key {
            Some(key) => TokenSigner::from_hex(key)?,
            None => {
                debug!("no signing key configured, generated a process-local key");
                TokenSigner::random()
            }
        };

        let rules = config
            .deny_rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| CompiledRule {
                        rule: rule.clone(),
                        regex,
                    })
                    .map_err(|source| PolicyError::InvalidPattern {
                        tool_id: rule.tool_id.clone(),
                        parameter: rule.parameter.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            signer,
            ledger,
            registry,
            rules,
            oracle: None,
            audit,
        })
    }

    /// Attaches the council consulted for destructive-tier tokens.
    pub fn with_oracle(mut self, oracle: Arc<dyn VotingOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Issues a token or explains why not. Every outcome is audited.
    pub async fn issue_token(
        &self,
        request: &TokenRequest,
    ) -> std::result::Result<CapabilityToken, TokenDenial> {
        let outcome = self.evaluate(request).await;
        match &outcome {
            Ok(token) => {
                info!(
                    agent = %request.agent_id,
                    tool_id = %request.tool_id,
                    token_id = %token.token_id,
                    "capability token issued"
                );
                self.audit.record(AuditRecord::new(
                    AuditAction::TokenIssued,
                    request.agent_id.clone(),
                    Some(request.trust_level),
                    json!({
                        "token_id": token.token_id,
                        "tool_id": token.tool_id,
                        "expires_at": token.expires_at,
                        "parameters_fingerprint": fingerprint(&token.parameters),
                    }),
                ));
            }
            Err(denial) => {
                warn!(
                    agent = %request.agent_id,
                    tool_id = %request.tool_id,
                    reason = %denial,
                    "capability token denied"
                );
                self.audit.record(AuditRecord::new(
                    AuditAction::TokenDenied,
                    request.agent_id.clone(),
                    Some(request.trust_level),
                    json!({
                        "tool_id": request.tool_id,
                        "code": denial.code(),
                        "reason": denial.to_string(),
                    }),
                ));
            }
        }
        outcome
    }

    async fn evaluate(
        &self,
        request: &TokenRequest,
    ) -> std::result::Result<CapabilityToken, TokenDenial> {
        if !self.config.is_agent_allowed(&request.agent_id) {
            return Err(TokenDenial::AgentNotAllowed(request.agent_id.clone()));
        }

        let definition = self
            .registry
            .get(&request.tool_id)
            .ok_or_else(|| TokenDenial::UnknownTool(request.tool_id.clone()))?;

        let tier = definition.permission_tier;
        let required = self.config.min_trust.for_tier(tier);
        if request.trust_level < required {
            return Err(TokenDenial::InsufficientTrust {
                tier,
                required,
                actual: request.trust_level,
            });
        }

        let parameters = normalize(&request.parameters);
        let report = self
            .registry
            .validate_parameters(&request.tool_id, &parameters)
            .map_err(|_| TokenDenial::UnknownTool(request.tool_id.clone()))?;
        if !report.is_valid() {
            return Err(TokenDenial::InvalidParameters(report.error_summary()));
        }

        self.check_deny_rules(&request.tool_id, &parameters)?;

        if tier == PermissionTier::Destructive && self.config.council_for_destructive {
            if let Some(oracle) = &self.oracle {
                self.council_approval(oracle.as_ref(), request).await?;
            }
        }

        self.mint(request, parameters)
    }

    fn check_deny_rules(
        &self,
        tool_id: &str,
        parameters: &Value,
    ) -> std::result::Result<(), TokenDenial> {
        for compiled in self.rules.iter().filter(|c| c.rule.applies_to(tool_id)) {
            let Some(value) = parameters.get(&compiled.rule.parameter) else {
                continue;
            };
            let matched = match value {
                Value::String(s) => compiled.regex.is_match(s),
                other => compiled.regex.is_match(&canonical_json(other)),
            };
            if matched {
                return Err(TokenDenial::ParameterDenied {
                    parameter: compiled.rule.parameter.clone(),
                    reason: compiled
                        .rule
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("matches /{}/", compiled.rule.pattern)),
                });
            }
        }
        Ok(())
    }

    async fn council_approval(
        &self,
        oracle: &dyn VotingOracle,
        request: &TokenRequest,
    ) -> std::result::Result<(), TokenDenial> {
        let vote = VoteRequest {
            topic: format!("destructive invocation of {}", request.tool_id),
            requester_id: request.agent_id.clone(),
            trust_level: request.trust_level,
            estimated_cost: 0.0,
            model: String::new(),
            security_sensitive: true,
            estimated_tokens: 0,
            required_ratio: self.config.council_ratio,
        };

        let ticket = oracle
            .create_vote(vote)
            .await
            .map_err(|e| TokenDenial::CouncilUnavailable(e.to_string()))?;
        let outcome = oracle
            .close_vote(&ticket.vote_id)
            .await
            .map_err(|e| TokenDenial::CouncilUnavailable(e.to_string()))?;

        if outcome.approved {
            return Ok(());
        }
        let reason = match (&outcome.vetoed_by, &outcome.veto_reason) {
            (Some(agent), Some(reason)) => format!("vetoed by {agent}: {reason}"),
            (Some(agent), None) => format!("vetoed by {agent}"),
            _ => format!(
                "approval {:.2} below required {:.2}",
                outcome.tally.approval_ratio(),
                outcome.required_ratio
            ),
        };
        Err(TokenDenial::CouncilRejected(reason))
    }

    fn mint(
        &self,
        request: &TokenRequest,
        parameters: Value,
    ) -> std::result::Result<CapabilityToken, TokenDenial> {
        let ttl = chrono::Duration::from_std(self.config.token_ttl())
            .map_err(|e| TokenDenial::Internal(e.to_string()))?;
        let issued_at = Utc::now().trunc_subsecs(3);
        let mut token = CapabilityToken {
            token_id: Uuid::new_v4().to_string(),
            tool_id: request.tool_id.clone(),
            agent_id: request.agent_id.clone(),
            trust_level: request.trust_level,
            parameters,
            issued_at,
            expires_at: issued_at + ttl,
            signature: String::new(),
        };
        self.signer
            .seal(&mut token)
            .map_err(|e| TokenDenial::Internal(e.to_string()))?;
        Ok(token)
    }

    /// [`TokenVerifier::verify_token`] against an explicit clock.
    pub fn verify_token_at(
        &self,
        token: &CapabilityToken,
        parameters: &Value,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), TokenRejection> {
        let result = self.check_token(token, parameters, now);
        match &result {
            Ok(()) => {
                debug!(token_id = %token.token_id, tool_id = %token.tool_id, "token verified");
                self.audit.record(AuditRecord::new(
                    AuditAction::TokenVerified,
                    token.agent_id.clone(),
                    Some(token.trust_level),
                    json!({ "token_id": token.token_id, "tool_id": token.tool_id }),
                ));
            }
            Err(rejection) => self.audit_rejection(token, rejection),
        }
        result
    }

    fn check_token(
        &self,
        token: &CapabilityToken,
        parameters: &Value,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), TokenRejection> {
        if !self.signer.verify(token) {
            return Err(TokenRejection::BadSignature);
        }
        if token.is_expired_at(now) {
            return Err(TokenRejection::Expired(token.expires_at));
        }
        match self.ledger.is_used(&token.token_id) {
            Ok(true) => return Err(TokenRejection::AlreadyUsed),
            Ok(false) => {}
            Err(e) => return Err(TokenRejection::LedgerUnavailable(e.to_string())),
        }
        if !canonical_eq(&token.parameters, &normalize(parameters)) {
            return Err(TokenRejection::ParameterMismatch);
        }
        // The capability may have been re-registered under a stricter tier
        // since issuance. A missing capability is left to the executor.
        if let Some(definition) = self.registry.get(&token.tool_id) {
            let tier = definition.permission_tier;
            let required = self.config.min_trust.for_tier(tier);
            if token.trust_level < required {
                return Err(TokenRejection::TierRaised {
                    tier,
                    required,
                    actual: token.trust_level,
                });
            }
        }
        Ok(())
    }

    fn audit_rejection(&self, token: &CapabilityToken, rejection: &TokenRejection) {
        warn!(
            token_id = %token.token_id,
            tool_id = %token.tool_id,
            reason = %rejection,
            "token rejected"
        );
        self.audit.record(AuditRecord::new(
            AuditAction::TokenRejected,
            token.agent_id.clone(),
            Some(token.trust_level),
            json!({
                "token_id": token.token_id,
                "tool_id": token.tool_id,
                "code": rejection.code(),
                "reason": rejection.to_string(),
            }),
        ));
    }

    /// Removes ledger entries for tokens that have already expired.
    pub fn purge_expired(&self) -> Result<usize> {
        self.ledger.purge_expired(Utc::now())
    }
}

impl TokenVerifier for PolicyEngine {
    fn verify_token(
        &self,
        token: &CapabilityToken,
        parameters: &Value,
    ) -> std::result::Result<(), TokenRejection> {
        self.verify_token_at(token, parameters, Utc::now())
    }

    fn mark_token_used(&self, token: &CapabilityToken) -> bool {
        match self.ledger.mark_used(&token.token_id, token.expires_at) {
            Ok(true) => {
                info!(token_id = %token.token_id, tool_id = %token.tool_id, "token consumed");
                self.audit.record(AuditRecord::new(
                    AuditAction::TokenUsed,
                    token.agent_id.clone(),
                    Some(token.trust_level),
                    json!({ "token_id": token.token_id, "tool_id": token.tool_id }),
                ));
                true
            }
            Ok(false) => {
                self.audit_rejection(token, &TokenRejection::AlreadyUsed);
                false
            }
            Err(e) => {
                error!(token_id = %token.token_id, error = %e, "token ledger write failed");
                self.audit_rejection(token, &TokenRejection::LedgerUnavailable(e.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_audit::MemoryAuditSink;
    use bulwark_registry::{CapabilityDefinition, ParamType, ToolHandler};
    use chrono::Duration;

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new(Arc::new(MemoryAuditSink::new()));
        registry
            .register(
                CapabilityDefinition::new("file_read", "Read file", PermissionTier::Read)
                    .with_parameter("path", ParamType::String, true),
                ToolHandler::Placeholder,
            )
            .unwrap();
        registry
            .register(
                CapabilityDefinition::new("file_delete", "Delete file", PermissionTier::Destructive)
                    .with_parameter("path", ParamType::String, true),
                ToolHandler::Placeholder,
            )
            .unwrap();
        Arc::new(registry)
    }

    fn engine(config: PolicyConfig) -> (PolicyEngine, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = PolicyEngine::new(
            config,
            registry(),
            TokenLedger::temporary().unwrap(),
            audit.clone(),
        )
        .unwrap();
        (engine, audit)
    }

    fn read_request(trust: TrustLevel, path: &str) -> TokenRequest {
        TokenRequest::new("agent-1", trust, "file_read", json!({ "path": path }))
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let (engine, audit) = engine(PolicyConfig::default());
        let token = engine
            .issue_token(&read_request(TrustLevel::Standard, "/a"))
            .await
            .unwrap();

        assert_eq!(token.tool_id, "file_read");
        assert_eq!(token.expires_at - token.issued_at, Duration::seconds(60));
        assert!(engine.verify_token(&token, &json!({"path": "/a"})).is_ok());
        assert_eq!(audit.count_action(AuditAction::TokenIssued), 1);
        assert_eq!(audit.count_action(AuditAction::TokenVerified), 1);
    }

    #[tokio::test]
    async fn test_trust_gate_per_tier() {
        let (engine, _) = engine(PolicyConfig::default());
        let denial = engine
            .issue_token(&read_request(TrustLevel::Untrusted, "/a"))
            .await
            .unwrap_err();
        assert!(matches!(denial, TokenDenial::InsufficientTrust { .. }));

        let delete = TokenRequest::new("agent-1", TrustLevel::Trusted, "file_delete", json!({"path": "/a"}));
        let denial = engine.issue_token(&delete).await.unwrap_err();
        assert_eq!(
            denial,
            TokenDenial::InsufficientTrust {
                tier: PermissionTier::Destructive,
                required: TrustLevel::Elevated,
                actual: TrustLevel::Trusted,
            }
        );
    }

    #[tokio::test]
    async fn test_allowlist_and_unknown_tool() {
        let (engine, audit) = engine(PolicyConfig::default().with_allowed_agent("planner"));
        let denial = engine
            .issue_token(&read_request(TrustLevel::Elevated, "/a"))
            .await
            .unwrap_err();
        assert_eq!(denial, TokenDenial::AgentNotAllowed("agent-1".into()));

        let request = TokenRequest::new("planner", TrustLevel::Elevated, "nope", json!({}));
        let denial = engine.issue_token(&request).await.unwrap_err();
        assert_eq!(denial, TokenDenial::UnknownTool("nope".into()));
        assert_eq!(audit.count_action(AuditAction::TokenDenied), 2);
    }

    #[tokio::test]
    async fn test_invalid_parameters_denied() {
        let (engine, _) = engine(PolicyConfig::default());
        let request = TokenRequest::new("agent-1", TrustLevel::Standard, "file_read", json!({"path": 7}));
        let denial = engine.issue_token(&request).await.unwrap_err();
        assert!(matches!(denial, TokenDenial::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_deny_rules() {
        let config = PolicyConfig::default()
            .with_deny_rule(DenyRule::new("*", "path", r"^/etc/").with_reason("system configuration"));
        let (engine, _) = engine(config);

        let denial = engine
            .issue_token(&read_request(TrustLevel::Standard, "/etc/shadow"))
            .await
            .unwrap_err();
        assert_eq!(
            denial,
            TokenDenial::ParameterDenied {
                parameter: "path".into(),
                reason: "system configuration".into(),
            }
        );
        assert!(engine
            .issue_token(&read_request(TrustLevel::Standard, "/home/a"))
            .await
            .is_ok());
    }

    #[test]
    fn test_bad_deny_pattern_is_config_error() {
        let config = PolicyConfig::default().with_deny_rule(DenyRule::new("*", "path", "("));
        let err = PolicyEngine::new(
            config,
            registry(),
            TokenLedger::temporary().unwrap(),
            Arc::new(MemoryAuditSink::new()),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn test_verification_failures() {
        let (engine, audit) = engine(PolicyConfig::default());
        let token = engine
            .issue_token(&read_request(TrustLevel::Standard, "/a"))
            .await
            .unwrap();

        assert_eq!(
            engine.verify_token(&token, &json!({"path": "/b"})),
            Err(TokenRejection::ParameterMismatch)
        );

        let later = token.expires_at + Duration::seconds(1);
        assert_eq!(
            engine.verify_token_at(&token, &json!({"path": "/a"}), later),
            Err(TokenRejection::Expired(token.expires_at))
        );

        let mut forged = token.clone();
        forged.parameters = json!({"path": "/b"});
        assert_eq!(
            engine.verify_token(&forged, &json!({"path": "/b"})),
            Err(TokenRejection::BadSignature)
        );
        assert_eq!(audit.count_action(AuditAction::TokenRejected), 3);
    }

    #[tokio::test]
    async fn test_mark_used_is_single_fire() {
        let (engine, audit) = engine(PolicyConfig::default());
        let token = engine
            .issue_token(&read_request(TrustLevel::Standard, "/a"))
            .await
            .unwrap();

        assert!(engine.mark_token_used(&token));
        assert!(!engine.mark_token_used(&token));
        assert_eq!(
            engine.verify_token(&token, &json!({"path": "/a"})),
            Err(TokenRejection::AlreadyUsed)
        );
        assert_eq!(audit.count_action(AuditAction::TokenUsed), 1);
    }

    #[tokio::test]
    async fn test_configured_key_is_shared() {
        let key = "11".repeat(32);
        let (a, _) = engine(PolicyConfig::default().with_signing_key(key.clone()));
        let (b, _) = engine(PolicyConfig::default().with_signing_key(key));
        let token = a
            .issue_token(&read_request(TrustLevel::Standard, "/a"))
            .await
            .unwrap();
        assert!(b.verify_token(&token, &json!({"path": "/a"})).is_ok());
    }
}
