//! # Bulwark Audit
//!
//! Shared side-effect plumbing for every Bulwark component: the append-only
//! audit trail and the non-authoritative notification bus.
//!
//! ## Overview
//!
//! Every state transition and authorization decision in the core emits
//! exactly one [`AuditRecord`] of the shape
//! `{action, actor_id, actor_trust_level, details}`. Records are written to an
//! [`AuditSink`], a write-only interface the core never reads back.
//!
//! Observability and UI layers subscribe to the [`EventBus`] for
//! notifications such as `tool:start` and `tool:end`. Publishing never
//! blocks and never fails the authorization path.
//!
//! ```text
//! ┌───────────┐  ┌─────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐
//! │ Sanitizer │  │ Breaker │  │ Governor │  │ Registry │  │ Executor │
//! └─────┬─────┘  └────┬────┘  └────┬─────┘  └────┬─────┘  └────┬─────┘
//!       └─────────────┴─────┬──────┴─────────────┴─────────────┘
//!                ┌──────────┴──────────┐
//!                ▼                     ▼
//!         ┌─────────────┐       ┌─────────────┐
//!         │ AuditSink   │       │  EventBus   │
//!         │ (authority) │       │  (notify)   │
//!         └─────────────┘       └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use bulwark_audit::{AuditAction, AuditRecord, AuditSink, MemoryAuditSink, TrustLevel};
//! use serde_json::json;
//!
//! let sink = MemoryAuditSink::new();
//! sink.record(AuditRecord::new(
//!     AuditAction::TokenIssued,
//!     "agent-7",
//!     Some(TrustLevel::Trusted),
//!     json!({"tool_id": "file_read"}),
//! ));
//! assert_eq!(sink.count_action(AuditAction::TokenIssued), 1);
//! ```

mod error;
mod events;
mod record;
mod sink;
mod trust;

pub use error::AuditError;
pub use events::{BusEvent, EventBus, DEFAULT_BUS_CAPACITY};
pub use record::{AuditAction, AuditRecord};
pub use sink::{AuditSink, FanoutAuditSink, JsonlAuditSink, MemoryAuditSink, TracingAuditSink};
pub use trust::TrustLevel;

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
