//! # Bulwark Policy
//!
//! Issues and verifies single-use capability tokens. A token names one
//! tool, one agent and the exact parameters that were approved; the
//! executor refuses to run anything else.
//!
//! ## Issuance Checks
//!
//! | Order | Check | Denial |
//! |-------|-------|--------|
//! | 1 | agent allowlist | `AgentNotAllowed` |
//! | 2 | tool registered | `UnknownTool` |
//! | 3 | trust level >= tier minimum | `InsufficientTrust` |
//! | 4 | parameters match the schema | `InvalidParameters` |
//! | 5 | parameter deny rules | `ParameterDenied` |
//! | 6 | council vote (destructive, when enabled) | `CouncilRejected` |
//!
//! ## Verification Checks
//!
//! Signature (constant time), expiry, prior use, then parameter binding
//! by canonical JSON equality. Consumption is a compare-and-swap on a Sled
//! ledger, so a token id authorizes at most one execution even when
//! replayed bit-for-bit.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bulwark_audit::{MemoryAuditSink, TrustLevel};
//! use bulwark_policy::{PolicyConfig, PolicyEngine, TokenLedger, TokenRequest, TokenVerifier};
//! use bulwark_registry::{CapabilityDefinition, ParamType, PermissionTier, ToolHandler, ToolRegistry};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let audit = Arc::new(MemoryAuditSink::new());
//! let registry = Arc::new(ToolRegistry::new(audit.clone()));
//! registry
//!     .register(
//!         CapabilityDefinition::new("file_read", "Read file", PermissionTier::Read)
//!             .with_parameter("path", ParamType::String, true),
//!         ToolHandler::Placeholder,
//!     )
//!     .unwrap();
//!
//! let engine = PolicyEngine::new(
//!     PolicyConfig::default(),
//!     registry,
//!     TokenLedger::temporary().unwrap(),
//!     audit,
//! )
//! .unwrap();
//!
//! let request = TokenRequest::new("agent-1", TrustLevel::Standard, "file_read", json!({"path": "/a"}));
//! let token = engine.issue_token(&request).await.unwrap();
//!
//! assert!(engine.verify_token(&token, &json!({"path": "/b"})).is_err());
//! assert!(engine.verify_token(&token, &json!({"path": "/a"})).is_ok());
//! assert!(engine.mark_token_used(&token));
//! assert!(!engine.mark_token_used(&token));
//! # });
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod token;

pub use config::{DenyRule, PolicyConfig, TierTrust, DEFAULT_TOKEN_TTL_SECS};
pub use engine::{PolicyEngine, TokenRequest, TokenVerifier};
pub use error::{PolicyError, Result, TokenDenial, TokenRejection};
pub use ledger::TokenLedger;
pub use token::{CapabilityToken, TokenSigner, SIGNING_KEY_LEN};
