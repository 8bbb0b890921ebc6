//! Typed execution outcomes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How an execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    /// Concurrency ceiling reached; the token was not touched.
    CapacityExceeded,
    /// Signature, expiry or parameter binding failed.
    InvalidToken,
    /// The token was already consumed.
    TokenReplayed,
    ToolNotFound,
    ValidationFailed,
    /// The handler returned an error or panicked.
    HandlerFailed,
    TimedOut,
    Aborted,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success => "success",
            ExecutionOutcome::CapacityExceeded => "capacity_exceeded",
            ExecutionOutcome::InvalidToken => "invalid_token",
            ExecutionOutcome::TokenReplayed => "token_replayed",
            ExecutionOutcome::ToolNotFound => "tool_not_found",
            ExecutionOutcome::ValidationFailed => "validation_failed",
            ExecutionOutcome::HandlerFailed => "handler_failed",
            ExecutionOutcome::TimedOut => "timed_out",
            ExecutionOutcome::Aborted => "aborted",
        }
    }

    /// True for outcomes decided before the handler started.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::CapacityExceeded
                | ExecutionOutcome::InvalidToken
                | ExecutionOutcome::TokenReplayed
                | ExecutionOutcome::ToolNotFound
                | ExecutionOutcome::ValidationFailed
        )
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one [`execute`](crate::ToolExecutor::execute) call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub call_id: String,
    pub tool_id: String,
    pub agent_id: String,
    pub session_id: Option<String>,
    pub outcome: ExecutionOutcome,
    /// Handler output on success.
    pub output: Option<Value>,
    /// Human-readable reason on failure.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Success
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Snapshot of a running execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveExecution {
    pub call_id: String,
    pub tool_id: String,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_names() {
        assert_eq!(ExecutionOutcome::TimedOut.to_string(), "timed_out");
        assert_eq!(
            serde_json::to_string(&ExecutionOutcome::TokenReplayed).unwrap(),
            "\"token_replayed\""
        );
        assert!(ExecutionOutcome::ValidationFailed.is_rejection());
        assert!(!ExecutionOutcome::Aborted.is_rejection());
    }
}
