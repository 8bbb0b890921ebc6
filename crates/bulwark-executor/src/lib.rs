//! # Bulwark Executor - Token-Gated Tool Execution
//!
//! The executor is the only path from an agent's intent to a side effect.
//! It refuses to run anything without a signed, unexpired, unused
//! capability token whose parameters match the call exactly, and it bounds
//! every handler with a deadline and a process-wide concurrency ceiling.
//!
//! | Outcome | Decided | Audit action |
//! |---------|---------|--------------|
//! | `capacity_exceeded` | before the token is read | `tool_rejected` |
//! | `invalid_token`, `token_replayed` | token check | `tool_rejected` |
//! | `tool_not_found`, `validation_failed` | after the token is consumed | `tool_rejected` |
//! | `success`, `handler_failed` | handler finished | `tool_executed` |
//! | `timed_out`, `aborted` | deadline or [`ToolExecutor::abort`] | `tool_aborted` |
//!
//! Admission never queues: when `max_concurrent` calls are in flight the
//! next one is turned away at once.

pub mod config;
pub mod executor;
pub mod result;

pub use config::{ExecutorConfig, ExecutorError, Result, DEFAULT_MAX_CONCURRENT};
pub use executor::{ExecuteOptions, ToolExecutor};
pub use result::{ActiveExecution, ExecutionOutcome, ExecutionResult};
