//! # Bulwark Core
//!
//! Unified authorization facade for autonomous agents.
//! Orchestrates the Sanitizer, Circuit Breakers, Policy Governor, Tool
//! Registry, Policy Engine and Tool Executor.
//!
//! ## Threat Coverage
//!
//! | Layer | Component | Threats Contained |
//! |-------|-----------|-------------------|
//! | Input | Sanitizer | Control-character smuggling, oversize payloads, flooding, injection phrases (flagged) |
//! | Availability | Circuit Breaker | Cascading provider failures, slow downstreams |
//! | Spend | Policy Governor | Runaway cost, low-trust sensitive requests, token floods |
//! | Catalog | Tool Registry | Tier-mismatched handlers, silent redefinition |
//! | Authorization | Policy Engine | Unlisted agents, under-trusted callers, forbidden parameters |
//! | Execution | Tool Executor | Replay, parameter substitution, hung handlers, overload |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           BULWARK CORE                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   inbound ──▶ Sanitizer                                          │
//! │                                                                  │
//! │   model call ──▶ Circuit Breaker ──▶ Policy Governor ──▶ Verdict  │
//! │                                          │                       │
//! │                                          ▼                       │
//! │                                   Voting Oracle                  │
//! │                                                                  │
//! │   tool call ──▶ Policy Engine ──token──▶ Tool Executor ──▶ Result │
//! │                      │                        │                  │
//! │                      └──── Tool Registry ◀────┘                  │
//! │                                                                  │
//! │   every component ──▶ Audit Sink          Event Bus ◀── executor │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use bulwark_audit::{MemoryAuditSink, TrustLevel};
//! use bulwark_core::{Bulwark, BulwarkConfig, GovernanceRequest};
//! use bulwark_council::LocalCouncil;
//!
//! let bulwark = Bulwark::new(
//!     BulwarkConfig::default(),
//!     Arc::new(MemoryAuditSink::new()),
//!     Arc::new(LocalCouncil::default()),
//! )
//! .unwrap();
//!
//! let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! let request = GovernanceRequest::new("planner", TrustLevel::Standard, "summarize the report");
//! let verdict = rt
//!     .block_on(bulwark.authorize_model_call("openai", &request, 0.001, "gpt-4o-mini"))
//!     .unwrap();
//! assert!(verdict.is_allowed());
//! ```
//!
//! ## Security Notes
//!
//! - Content is never treated as a command: the sanitizer flags, it does not block
//! - Governance and token checks fail closed, including when the council is unreachable
//! - A veto always wins over a favorable vote
//! - Tokens are consumed before the handler runs; a crash cannot be replayed

mod bulwark;
mod config;
mod error;
mod verdict;

pub use bulwark::Bulwark;
pub use config::{BulwarkConfig, RegistryConfig, StorageConfig};
pub use error::BulwarkError;
pub use verdict::{BlockReason, Verdict};

// Re-export component types for convenience
pub use bulwark_audit::{AuditAction, AuditRecord, AuditSink, BusEvent, EventBus, TrustLevel};
pub use bulwark_breaker::{BreakerConfig, BreakerStats, CircuitState};
pub use bulwark_council::{GovernanceDecision, GovernanceRequest, GovernorConfig, VetoDomain, VotingMechanism};
pub use bulwark_executor::{ExecuteOptions, ExecutionOutcome, ExecutionResult, ExecutorConfig};
pub use bulwark_policy::{CapabilityToken, PolicyConfig, TokenDenial, TokenRequest};
pub use bulwark_registry::{
    handler_fn, CancelSignal, CapabilityDefinition, HandlerError, ParamType, PermissionTier,
    ToolHandler,
};
pub use bulwark_sanitizer::{InboundMessage, SanitizedMessage, SanitizerConfig};

/// Core result type for Bulwark operations.
pub type Result<T> = std::result::Result<T, BulwarkError>;
