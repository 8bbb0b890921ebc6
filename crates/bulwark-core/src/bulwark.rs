//! The unified Bulwark facade.
//!
//! [`Bulwark`] owns one instance of every component, wires them to a shared
//! audit sink and event bus, and exposes the two authorization paths an
//! agent runtime needs: model calls and tool calls.

use std::path::Path;
use std::sync::Arc;

use bulwark_audit::{
    AuditSink, EventBus, FanoutAuditSink, JsonlAuditSink, TracingAuditSink, TrustLevel,
};
use bulwark_breaker::{BreakerSet, BreakerStats};
use bulwark_council::{GovernanceDecision, GovernanceRequest, LocalCouncil, PolicyGovernor, VotingOracle};
use bulwark_executor::{ActiveExecution, ExecuteOptions, ExecutionResult, ToolExecutor};
use bulwark_policy::{CapabilityToken, PolicyEngine, TokenDenial, TokenLedger, TokenRequest};
use bulwark_registry::{CapabilityDefinition, CapabilityManifest, CapabilitySummary, ToolHandler, ToolRegistry};
use bulwark_sanitizer::{InboundMessage, SanitizedMessage, Sanitizer};
use tracing::{debug, info, warn};

use crate::config::BulwarkConfig;
use crate::verdict::{BlockReason, Verdict};
use crate::Result;

/// The unified Bulwark authorization facade.
///
/// # Security Model
///
/// Model calls:
/// 1. Circuit breaker for the provider (reject fast when degraded)
/// 2. Policy governor (cost tier, council vote, vetoes)
///
/// Tool calls:
/// 1. Policy engine issues a single-use, parameter-bound token
/// 2. Executor re-verifies and consumes it, then runs the handler under a
///    deadline
///
/// Every path is fail-closed and audited.
///
/// # Example
///
/// ```rust,ignore
/// let bulwark = Bulwark::from_config(BulwarkConfig::load("bulwark.toml")?)?;
///
/// let verdict = bulwark.authorize_model_call("openai", &request, 0.30, "gpt-4o").await?;
/// if verdict.is_allowed() {
///     let ok = call_provider().await.is_ok();
///     bulwark.record_provider_outcome("openai", ok)?;
/// }
/// ```
pub struct Bulwark {
    config: BulwarkConfig,
    audit: Arc<dyn AuditSink>,
    bus: Arc<EventBus>,
    sanitizer: Sanitizer,
    breakers: BreakerSet,
    governor: PolicyGovernor,
    registry: Arc<ToolRegistry>,
    policy: Arc<PolicyEngine>,
    executor: ToolExecutor,
}

impl std::fmt::Debug for Bulwark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulwark")
            .field("providers", &self.breakers.providers())
            .field("capabilities", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Bulwark {
    /// Wires every component.
    ///
    /// `council` is the voting oracle consulted by the governor and, when
    /// `policy.council_for_destructive` is set, by the policy engine.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Any configuration section is invalid
    /// - The capability manifest cannot be loaded
    /// - The token ledger cannot be opened
    pub fn new(
        config: BulwarkConfig,
        audit: Arc<dyn AuditSink>,
        council: Arc<dyn VotingOracle>,
    ) -> Result<Self> {
        config.validate()?;
        let bus = Arc::new(EventBus::new());

        let sanitizer = Sanitizer::new(config.sanitizer.clone(), audit.clone())?;
        let breakers = BreakerSet::new(config.breaker, audit.clone())?
            .with_event_bus(bus.clone())
            .with_providers(config.providers.iter().cloned())?;
        let governor = PolicyGovernor::new(config.governor.clone(), council.clone(), audit.clone())?;

        let registry = Arc::new(
            ToolRegistry::new(audit.clone())
                .with_unknown_parameter_policy(config.registry.unknown_parameters),
        );
        if let Some(path) = &config.registry.manifest {
            let loaded = registry.load_capabilities_from_config(CapabilityManifest::load(path)?)?;
            info!(path = %path.display(), loaded, "capability manifest loaded");
        }

        let ledger = match &config.storage.ledger_path {
            Some(path) => TokenLedger::open(path)?,
            None => {
                warn!("no ledger_path configured; used tokens are forgotten on restart");
                TokenLedger::temporary()?
            }
        };
        let policy = Arc::new(
            PolicyEngine::new(config.policy.clone(), registry.clone(), ledger, audit.clone())?
                .with_oracle(council),
        );
        let executor = ToolExecutor::new(config.executor, registry.clone(), policy.clone(), audit.clone())?
            .with_event_bus(bus.clone());

        info!(
            providers = breakers.len(),
            capabilities = registry.len(),
            max_concurrent = config.executor.max_concurrent,
            "Bulwark initialized"
        );

        Ok(Self {
            config,
            audit,
            bus,
            sanitizer,
            breakers,
            governor,
            registry,
            policy,
            executor,
        })
    }

    /// Builds a standalone instance: audit records go to tracing and, if
    /// configured, to the JSON Lines log; votes go to an in-process
    /// [`LocalCouncil`].
    pub fn from_config(config: BulwarkConfig) -> Result<Self> {
        let mut fanout = FanoutAuditSink::new().with_sink(Arc::new(TracingAuditSink));
        if let Some(path) = &config.storage.audit_log {
            fanout = fanout.with_sink(Arc::new(JsonlAuditSink::open(path)?));
        }
        Self::new(config, Arc::new(fanout), Arc::new(LocalCouncil::default()))
    }

    pub fn config(&self) -> &BulwarkConfig {
        &self.config
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Bus carrying `tool:*` and `circuit:state` events.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn governor(&self) -> &PolicyGovernor {
        &self.governor
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    // ---- inbound content ----

    /// Sanitizes a message from an untrusted sender.
    ///
    /// An error means the message must not be trusted.
    pub fn sanitize_inbound(&self, message: InboundMessage) -> Result<SanitizedMessage> {
        Ok(self.sanitizer.sanitize(message)?)
    }

    /// Sanitizes a message whose sender's trust level is known.
    pub fn sanitize_inbound_with_trust(
        &self,
        message: InboundMessage,
        trust: TrustLevel,
    ) -> Result<SanitizedMessage> {
        Ok(self.sanitizer.sanitize_with_trust(message, trust)?)
    }

    // ---- model calls ----

    /// Decides whether a model call to `provider` may proceed.
    ///
    /// On [`Verdict::Allow`] the caller must report the provider outcome
    /// with [`record_provider_outcome`](Self::record_provider_outcome).
    pub async fn authorize_model_call(
        &self,
        provider: &str,
        request: &GovernanceRequest,
        cost: f64,
        model: &str,
    ) -> Result<Verdict> {
        let breaker = self.breakers.get_or_create(provider)?;
        if !breaker.can_execute() {
            warn!(provider = %provider, model = %model, "model call blocked: circuit open");
            return Ok(Verdict::block(BlockReason::ProviderUnavailable {
                provider: provider.to_string(),
            }));
        }

        let decision = self.governor.request_approval(request, cost, model).await;
        if !decision.approved {
            // The provider will not be called, so no outcome will be reported.
            breaker.release();
        }
        debug!(
            provider = %provider,
            approved = decision.approved,
            mechanism = %decision.mechanism,
            "model call decided"
        );
        Ok(Verdict::from_decision(decision))
    }

    /// Feeds a provider call outcome to its breaker.
    pub fn record_provider_outcome(&self, provider: &str, ok: bool) -> Result<()> {
        let breaker = self.breakers.get_or_create(provider)?;
        if ok {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
        Ok(())
    }

    /// Forces a provider's breaker closed.
    pub fn reset_provider(&self, provider: &str) -> bool {
        match self.breakers.get(provider) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn provider_stats(&self) -> Vec<BreakerStats> {
        self.breakers.stats()
    }

    /// Fast-path spend check against a budget cap.
    pub fn emergency_budget_vote(&self, spent: f64, cap: f64) -> GovernanceDecision {
        self.governor.emergency_budget_vote(spent, cap)
    }

    // ---- capabilities ----

    pub fn register_capability(&self, definition: CapabilityDefinition, handler: ToolHandler) -> Result<()> {
        Ok(self.registry.register(definition, handler)?)
    }

    /// Binds a real handler to a manifest-loaded capability.
    pub fn bind_handler(&self, id: &str, handler: ToolHandler) -> Result<()> {
        Ok(self.registry.register_handler(id, handler)?)
    }

    /// Loads a `.json` or `.toml` manifest; returns how many capabilities
    /// were registered.
    pub fn load_manifest<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let manifest = CapabilityManifest::load(path)?;
        Ok(self.registry.load_capabilities_from_config(manifest)?)
    }

    pub fn capabilities(&self) -> Vec<CapabilitySummary> {
        self.registry.list()
    }

    // ---- tool calls ----

    /// Requests a single-use token for one tool call.
    pub async fn issue_tool_token(
        &self,
        request: &TokenRequest,
    ) -> std::result::Result<CapabilityToken, TokenDenial> {
        self.policy.issue_token(request).await
    }

    /// Spends `token` on one execution. Never fails; inspect the outcome.
    pub async fn execute_tool(&self, token: &CapabilityToken, options: ExecuteOptions) -> ExecutionResult {
        self.executor.execute(token, options).await
    }

    /// Raises the cancel signal of a running tool call.
    pub fn abort_tool(&self, call_id: &str) -> bool {
        self.executor.abort(call_id)
    }

    pub fn active_tools(&self) -> Vec<ActiveExecution> {
        self.executor.active_executions()
    }

    /// Drops ledger entries for expired tokens.
    pub fn purge_expired_tokens(&self) -> Result<usize> {
        Ok(self.policy.purge_expired()?)
    }
}
