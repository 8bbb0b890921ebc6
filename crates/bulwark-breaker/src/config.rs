//! Breaker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BreakerError, Result};

/// Thresholds and timings for a [`CircuitBreaker`](crate::CircuitBreaker).
///
/// # Example
///
/// ```rust
/// use bulwark_breaker::BreakerConfig;
///
/// let config = BreakerConfig::new()
///     .with_failure_threshold(3)
///     .with_recovery_timeout_ms(10_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures inside the window that open the circuit.
    pub failure_threshold: u32,
    /// Sliding failure window, in milliseconds.
    pub failure_window_ms: u64,
    /// Time spent open before a probe is allowed, in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Consecutive half-open successes needed to close.
    pub half_open_success_threshold: u32,
    /// Probe calls admitted concurrently while half-open.
    pub half_open_max_in_flight: u32,
}

impl BreakerConfig {
    /// Creates a config with default values.
    ///
    /// Defaults:
    /// - Failure threshold: 5
    /// - Failure window: 60s
    /// - Recovery timeout: 30s
    /// - Half-open success threshold: 2
    /// - Half-open in-flight probes: 1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_ms: 60_000,
            recovery_timeout_ms: 30_000,
            half_open_success_threshold: 2,
            half_open_max_in_flight: 1,
        }
    }

    /// Sets the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the failure window.
    #[must_use]
    pub const fn with_failure_window_ms(mut self, ms: u64) -> Self {
        self.failure_window_ms = ms;
        self
    }

    /// Sets the recovery timeout.
    #[must_use]
    pub const fn with_recovery_timeout_ms(mut self, ms: u64) -> Self {
        self.recovery_timeout_ms = ms;
        self
    }

    /// Sets the half-open success threshold.
    #[must_use]
    pub const fn with_half_open_success_threshold(mut self, successes: u32) -> Self {
        self.half_open_success_threshold = successes;
        self
    }

    /// Sets the number of concurrent half-open probes.
    #[must_use]
    pub const fn with_half_open_max_in_flight(mut self, probes: u32) -> Self {
        self.half_open_max_in_flight = probes;
        self
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    /// Rejects zero values.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.failure_threshold == 0, "failure_threshold"),
            (self.failure_window_ms == 0, "failure_window_ms"),
            (self.recovery_timeout_ms == 0, "recovery_timeout_ms"),
            (self.half_open_success_threshold == 0, "half_open_success_threshold"),
            (self.half_open_max_in_flight == 0, "half_open_max_in_flight"),
        ];
        for (invalid, field) in checks {
            if invalid {
                return Err(BreakerError::InvalidConfig(format!("{} must be > 0", field)));
            }
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.failure_window(), Duration::from_secs(60));
        assert_eq!(config.recovery_timeout(), Duration::from_secs(30));
        assert_eq!(config.half_open_success_threshold, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_names_the_bad_field() {
        let err = BreakerConfig::new().with_half_open_success_threshold(0).validate().unwrap_err();
        assert_eq!(
            err,
            BreakerError::InvalidConfig("half_open_success_threshold must be > 0".to_string())
        );
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: BreakerConfig = serde_json::from_str(r#"{"failure_threshold": 2}"#).unwrap();
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.recovery_timeout_ms, 30_000);
    }
}
