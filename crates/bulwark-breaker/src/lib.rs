//! # Bulwark Breaker - Provider Failure Isolation
//!
//! A slow or failing model provider must not drag the whole agent down with
//! it. Each provider is wrapped in a [`CircuitBreaker`] that counts failures
//! in a sliding window and, once a threshold is crossed, rejects calls fast
//! until the provider has had time to recover.
//!
//! | State | `can_execute` | Leaves when |
//! |-------|---------------|-------------|
//! | `Closed` | always true | N failures inside the window |
//! | `Open` | false until the recovery timeout, then one probe | recovery timeout elapses |
//! | `HalfOpen` | up to `half_open_max_in_flight` probes | K successes (close) or any failure (reopen) |
//!
//! Breakers do not retry and do not observe outcomes on their own.
//!
//! ```rust
//! use std::sync::Arc;
//! use bulwark_audit::MemoryAuditSink;
//! use bulwark_breaker::{BreakerConfig, BreakerSet, CircuitState};
//!
//! let set = BreakerSet::new(BreakerConfig::new().with_failure_threshold(2), Arc::new(MemoryAuditSink::new())).unwrap();
//! let openai = set.get_or_create("openai").unwrap();
//!
//! openai.record_failure();
//! openai.record_failure();
//! assert_eq!(openai.state(), CircuitState::Open);
//! assert!(!openai.can_execute());
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod set;

pub use breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use config::BreakerConfig;
pub use error::{BreakerError, Result};
pub use set::BreakerSet;
