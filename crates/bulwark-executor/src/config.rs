//! Executor configuration and construction errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default process-wide ceiling on concurrent executions.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Result type alias for executor construction.
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Executor construction errors. Execution itself never errors; see
/// [`ExecutionResult`](crate::ExecutionResult).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("invalid executor configuration: {0}")]
    Config(String),
}

/// Configuration for [`ToolExecutor`](crate::ToolExecutor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Calls beyond this many are rejected immediately, never queued.
    pub max_concurrent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    #[must_use]
    pub const fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ExecutorError::Config("max_concurrent must be > 0".into()));
        }
        Ok(())
    }
}
