//! # Bulwark Registry - Capability Catalog
//!
//! The registry is the single source of truth for what an agent *can* invoke.
//! It stores capability contracts and their handlers; whether a given agent
//! *may* invoke one is decided elsewhere (the policy engine).
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Append-only catalog | `register` fails with `AlreadyRegistered`; redefinition needs `unregister` |
//! | Tier-safe dispatch | `ToolHandler::{Read, Write, Destructive}` must match the declared tier |
//! | Reviewable manifests | manifest entries get a placeholder that fails loudly until bound |
//! | Tamper evidence | every definition's canonical JSON is fingerprinted with SHA-256 |
//! | Cooperative cancellation | every invocation receives a [`CancelSignal`] |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      TOOL REGISTRY                       │
//! ├──────────────────────────────────────────────────────────┤
//! │  id ──► ┌────────────────────┐   ┌────────────────────┐  │
//! │         │ CapabilityDefinition│   │    ToolHandler     │  │
//! │         │  params / timeout   │   │ Read│Write│Destr.  │  │
//! │         │  sandbox / tier     │   │   │Placeholder     │  │
//! │         └─────────┬──────────┘   └────────────────────┘  │
//! │                   │ canonical JSON ─► SHA-256 fingerprint │
//! │                   ▼                                       │
//! │          validate_parameters ─► ValidationReport          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use bulwark_audit::MemoryAuditSink;
//! use bulwark_registry::{
//!     handler_fn, CancelSignal, CapabilityDefinition, HandlerError, ParamType,
//!     PermissionTier, ToolHandler, ToolRegistry,
//! };
//! use serde_json::{json, Value};
//!
//! let registry = ToolRegistry::new(Arc::new(MemoryAuditSink::new()));
//! registry
//!     .register(
//!         CapabilityDefinition::new("file_read", "Read file", PermissionTier::Read)
//!             .with_parameter("path", ParamType::String, true),
//!         ToolHandler::read(handler_fn(|params: Value, _cancel: CancelSignal| async move {
//!             Ok::<_, HandlerError>(json!({ "read": params["path"] }))
//!         })),
//!     )
//!     .unwrap();
//!
//! let report = registry.validate_parameters("file_read", &json!({})).unwrap();
//! assert_eq!(report.error_summary(), "missing required parameter 'path'");
//! ```

pub mod canonical;
pub mod cancel;
pub mod error;
pub mod handler;
pub mod manifest;
pub mod models;
pub mod registry;

pub use cancel::CancelSignal;
pub use canonical::{canonical_eq, canonical_json, fingerprint};
pub use error::{RegistryError, Result};
pub use handler::{handler_fn, CapabilityHandler, FnHandler, HandlerError, ToolHandler};
pub use manifest::CapabilityManifest;
pub use models::{
    json_type_name, validate_against, CapabilityDefinition, ParamType, ParameterSpec,
    PermissionTier, UnknownParameterPolicy, ValidationIssue, ValidationReport, DEFAULT_SANDBOXED,
    DEFAULT_TIMEOUT,
};
pub use registry::{CapabilitySummary, ToolRegistry};
