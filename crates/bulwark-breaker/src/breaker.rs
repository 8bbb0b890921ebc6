//! Three-state circuit breaker.
//!
//! ```text
//!            N failures in window
//!   CLOSED ───────────────────────► OPEN
//!     ▲                              │
//!     │ K successes                  │ recovery timeout elapsed
//!     │                              │ (observed by can_execute)
//!     │                              ▼
//!     └──────────────────────── HALF_OPEN
//!                                    │
//!              any failure ──────────┘──► OPEN
//! ```
//!
//! The breaker never observes outcomes on its own. Callers must report every
//! attempt through [`CircuitBreaker::record_success`] or
//! [`CircuitBreaker::record_failure`], or use [`CircuitBreaker::call`].
//!
//! All state lives behind one mutex per breaker, so concurrent reports for the
//! same provider are serialized. Audit records and bus events are emitted
//! after the lock is released.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bulwark_audit::{AuditAction, AuditRecord, AuditSink, BusEvent, EventBus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;
use crate::error::{BreakerError, Result};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the recovery timeout elapses.
    Open,
    /// A limited number of probe calls test whether the provider recovered.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStats {
    pub provider: String,
    pub state: CircuitState,
    /// Failures currently inside the sliding window.
    pub failures_in_window: usize,
    pub half_open_successes: u32,
    pub probes_in_flight: u32,
    /// Calls refused by `can_execute` since creation.
    pub rejected_calls: u64,
    pub last_transition: DateTime<Utc>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
    probes_in_flight: u32,
    rejected_calls: u64,
    last_transition: DateTime<Utc>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            half_open_successes: 0,
            probes_in_flight: 0,
            rejected_calls: 0,
            last_transition: Utc::now(),
        }
    }

    fn prune(&mut self, config: &BreakerConfig, now: Instant) {
        let window = config.failure_window();
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> Transition {
        let from = self.state;
        self.state = to;
        self.last_transition = Utc::now();
        match to {
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.half_open_successes = 0;
                self.probes_in_flight = 0;
            }
            CircuitState::HalfOpen => {
                self.half_open_successes = 0;
                self.probes_in_flight = 0;
            }
            CircuitState::Closed => {
                self.opened_at = None;
                self.failures.clear();
                self.half_open_successes = 0;
                self.probes_in_flight = 0;
            }
        }
        Transition { from, to }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

/// Circuit breaker for one downstream provider.
pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    audit: Arc<dyn AuditSink>,
    bus: Option<Arc<EventBus>>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::InvalidConfig`] if any threshold is zero.
    pub fn new(
        provider: impl Into<String>,
        config: BreakerConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(Inner::new()),
            audit,
            bus: None,
        })
    }

    /// Publishes state changes on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state. Does not perform the open to half-open transition.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// The only gate: true if a call may proceed now.
    pub fn can_execute(&self) -> bool {
        self.can_execute_at(Instant::now())
    }

    /// [`can_execute`](Self::can_execute) against an explicit clock.
    pub fn can_execute_at(&self, now: Instant) -> bool {
        let (allowed, transition) = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => (true, None),
                CircuitState::Open => {
                    let recovered = inner.opened_at.map_or(true, |opened| {
                        now.saturating_duration_since(opened) >= self.config.recovery_timeout()
                    });
                    if recovered {
                        let t = inner.transition(CircuitState::HalfOpen, now);
                        inner.probes_in_flight = 1;
                        (true, Some(t))
                    } else {
                        inner.rejected_calls += 1;
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.probes_in_flight < self.config.half_open_max_in_flight {
                        inner.probes_in_flight += 1;
                        (true, None)
                    } else {
                        inner.rejected_calls += 1;
                        (false, None)
                    }
                }
            }
        };

        if let Some(t) = transition {
            self.emit(t, json!({}));
        }
        if !allowed {
            debug!(provider = %self.provider, "call rejected by circuit breaker");
        }
        allowed
    }

    /// Reports a successful attempt.
    pub fn record_success(&self) {
        self.record_success_at(Instant::now());
    }

    /// [`record_success`](Self::record_success) against an explicit clock.
    pub fn record_success_at(&self, now: Instant) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.prune(&self.config, now);
            match inner.state {
                CircuitState::Closed => None,
                CircuitState::HalfOpen => {
                    inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.half_open_success_threshold {
                        Some(inner.transition(CircuitState::Closed, now))
                    } else {
                        None
                    }
                }
                CircuitState::Open => {
                    debug!(provider = %self.provider, "success reported while circuit open");
                    None
                }
            }
        };

        if let Some(t) = transition {
            self.emit(t, json!({ "successes": self.config.half_open_success_threshold }));
        }
    }

    /// Reports a failed attempt.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// [`record_failure`](Self::record_failure) against an explicit clock.
    pub fn record_failure_at(&self, now: Instant) {
        let (transition, failures) = {
            let mut inner = self.inner.lock();
            inner.prune(&self.config, now);
            let transition = match inner.state {
                CircuitState::Closed => {
                    inner.failures.push_back(now);
                    (inner.failures.len() >= self.config.failure_threshold as usize)
                        .then(|| inner.transition(CircuitState::Open, now))
                }
                CircuitState::HalfOpen => Some(inner.transition(CircuitState::Open, now)),
                CircuitState::Open => {
                    debug!(provider = %self.provider, "failure reported while circuit open");
                    None
                }
            };
            (transition, inner.failures.len())
        };

        if let Some(t) = transition {
            self.emit(t, json!({ "failures_in_window": failures }));
        }
    }

    /// Hands back a half-open probe slot without reporting an outcome.
    ///
    /// For callers that passed [`can_execute`](Self::can_execute) and then
    /// decided not to call the provider. No effect outside `HalfOpen`.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }

    /// Forces the breaker closed. Administrative override.
    pub fn reset(&self) {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            inner.transition(CircuitState::Closed, Instant::now());
            from
        };

        info!(provider = %self.provider, from = %from, "circuit breaker reset");
        self.audit.record(AuditRecord::new(
            AuditAction::CircuitReset,
            self.provider.clone(),
            None,
            json!({ "from": from.as_str() }),
        ));
        if from != CircuitState::Closed {
            self.publish(from, CircuitState::Closed);
        }
    }

    /// Snapshot of the breaker.
    pub fn stats(&self) -> BreakerStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> BreakerStats {
        let mut inner = self.inner.lock();
        inner.prune(&self.config, now);
        BreakerStats {
            provider: self.provider.clone(),
            state: inner.state,
            failures_in_window: inner.failures.len(),
            half_open_successes: inner.half_open_successes,
            probes_in_flight: inner.probes_in_flight,
            rejected_calls: inner.rejected_calls,
            last_transition: inner.last_transition,
        }
    }

    /// Gates `op`, runs it, and records the outcome.
    ///
    /// Returns `Err(BreakerError::Open)` without running `op` when rejected.
    /// Otherwise returns the operation's own result.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<std::result::Result<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if !self.can_execute() {
            return Err(BreakerError::Open {
                provider: self.provider.clone(),
            });
        }
        let outcome = op().await;
        match &outcome {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        Ok(outcome)
    }

    fn emit(&self, t: Transition, details: serde_json::Value) {
        let action = match t.to {
            CircuitState::Open => {
                warn!(provider = %self.provider, from = %t.from, "circuit opened");
                AuditAction::CircuitOpened
            }
            CircuitState::HalfOpen => {
                info!(provider = %self.provider, "circuit half-open, probing provider");
                AuditAction::CircuitHalfOpened
            }
            CircuitState::Closed => {
                info!(provider = %self.provider, "circuit closed after recovery");
                AuditAction::CircuitClosed
            }
        };

        let mut details = details;
        if let Some(map) = details.as_object_mut() {
            map.insert("from".into(), json!(t.from.as_str()));
            map.insert("to".into(), json!(t.to.as_str()));
        }
        self.audit
            .record(AuditRecord::new(action, self.provider.clone(), None, details));
        self.publish(t.from, t.to);
    }

    fn publish(&self, from: CircuitState, to: CircuitState) {
        if let Some(bus) = &self.bus {
            bus.publish(BusEvent::CircuitStateChanged {
                provider: self.provider.clone(),
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
                at: Utc::now(),
            });
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_audit::MemoryAuditSink;
    use std::time::Duration;

    fn breaker(config: BreakerConfig) -> (CircuitBreaker, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        (CircuitBreaker::new("openai", config, audit.clone()).unwrap(), audit)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_opens_after_threshold_failures_in_window() {
        let (b, audit) = breaker(BreakerConfig::new().with_failure_threshold(3));
        let t0 = Instant::now();

        b.record_failure_at(t0);
        b.record_failure_at(t0 + ms(10));
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.can_execute_at(t0 + ms(15)));

        b.record_failure_at(t0 + ms(20));
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.can_execute_at(t0 + ms(30)));
        assert_eq!(audit.count_action(AuditAction::CircuitOpened), 1);
    }

    #[test]
    fn test_failures_outside_window_are_pruned() {
        let config = BreakerConfig::new()
            .with_failure_threshold(3)
            .with_failure_window_ms(1_000);
        let (b, _) = breaker(config);
        let t0 = Instant::now();

        b.record_failure_at(t0);
        b.record_failure_at(t0 + ms(100));
        b.record_failure_at(t0 + ms(1_500));

        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.stats_at(t0 + ms(1_500)).failures_in_window, 1);
    }

    #[test]
    fn test_release_returns_probe_slot() {
        let config = BreakerConfig::new()
            .with_failure_threshold(1)
            .with_recovery_timeout_ms(100);
        let (b, _) = breaker(config);
        let t0 = Instant::now();

        b.record_failure_at(t0);
        assert!(b.can_execute_at(t0 + ms(100)));
        assert!(!b.can_execute_at(t0 + ms(101)));

        b.release();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.can_execute_at(t0 + ms(102)));
    }

    #[test]
    fn test_failures_after_trip_are_not_counted() {
        let config = BreakerConfig::new()
            .with_failure_threshold(2)
            .with_recovery_timeout_ms(1_000);
        let (b, audit) = breaker(config);
        let t0 = Instant::now();

        b.record_failure_at(t0);
        b.record_failure_at(t0 + ms(1));
        assert_eq!(b.state(), CircuitState::Open);
        for i in 2..7 {
            b.record_failure_at(t0 + ms(i));
        }
        assert_eq!(b.stats_at(t0 + ms(10)).failures_in_window, 2);
        assert_eq!(audit.count_action(AuditAction::CircuitOpened), 1);

        // A failed probe reopens without growing the window either.
        assert!(b.can_execute_at(t0 + ms(1_001)));
        b.record_failure_at(t0 + ms(1_002));
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.stats_at(t0 + ms(1_002)).failures_in_window, 2);
    }

    #[test]
    fn test_open_admits_one_probe_after_recovery_timeout() {
        let config = BreakerConfig::new()
            .with_failure_threshold(1)
            .with_recovery_timeout_ms(500);
        let (b, audit) = breaker(config);
        let t0 = Instant::now();

        b.record_failure_at(t0);
        assert!(!b.can_execute_at(t0 + ms(499)));

        assert!(b.can_execute_at(t0 + ms(500)));
        assert_eq!(b.state(), CircuitState::HalfOpen);
        // The probe slot is taken until its outcome is reported.
        assert!(!b.can_execute_at(t0 + ms(501)));
        assert_eq!(audit.count_action(AuditAction::CircuitHalfOpened), 1);
    }

    #[test]
    fn test_half_open_closes_after_k_successes() {
        let config = BreakerConfig::new()
            .with_failure_threshold(1)
            .with_recovery_timeout_ms(100)
            .with_half_open_success_threshold(2);
        let (b, audit) = breaker(config);
        let t0 = Instant::now();

        b.record_failure_at(t0);
        assert!(b.can_execute_at(t0 + ms(100)));
        b.record_success_at(t0 + ms(110));
        assert_eq!(b.state(), CircuitState::HalfOpen);

        assert!(b.can_execute_at(t0 + ms(120)));
        b.record_success_at(t0 + ms(130));
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.stats_at(t0 + ms(130)).failures_in_window, 0);
        assert_eq!(audit.count_action(AuditAction::CircuitClosed), 1);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let config = BreakerConfig::new()
            .with_failure_threshold(1)
            .with_recovery_timeout_ms(100);
        let (b, audit) = breaker(config);
        let t0 = Instant::now();

        b.record_failure_at(t0);
        assert!(b.can_execute_at(t0 + ms(100)));
        b.record_success_at(t0 + ms(105));
        assert!(b.can_execute_at(t0 + ms(106)));
        b.record_failure_at(t0 + ms(110));

        assert_eq!(b.state(), CircuitState::Open);
        let stats = b.stats_at(t0 + ms(110));
        assert_eq!(stats.half_open_successes, 0);
        // Recovery timer restarts from the new failure.
        assert!(!b.can_execute_at(t0 + ms(150)));
        assert!(b.can_execute_at(t0 + ms(210)));
        assert_eq!(audit.count_action(AuditAction::CircuitOpened), 2);
    }

    #[test]
    fn test_reset_forces_closed() {
        let (b, audit) = breaker(BreakerConfig::new().with_failure_threshold(1));
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);

        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.can_execute());
        assert_eq!(audit.count_action(AuditAction::CircuitReset), 1);
    }

    #[test]
    fn test_rejections_are_counted() {
        let (b, _) = breaker(BreakerConfig::new().with_failure_threshold(1));
        let t0 = Instant::now();
        b.record_failure_at(t0);
        b.can_execute_at(t0 + ms(1));
        b.can_execute_at(t0 + ms(2));
        assert_eq!(b.stats_at(t0 + ms(2)).rejected_calls, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let audit = Arc::new(MemoryAuditSink::new());
        let result = CircuitBreaker::new("p", BreakerConfig::new().with_failure_threshold(0), audit);
        assert!(matches!(result, Err(BreakerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_call_records_outcomes() {
        let (b, _) = breaker(BreakerConfig::new().with_failure_threshold(2));

        let ok: Result<std::result::Result<u32, String>> = b.call(|| async { Ok(7) }).await;
        assert_eq!(ok.unwrap().unwrap(), 7);

        for _ in 0..2 {
            let _ = b.call(|| async { Err::<u32, _>("boom".to_string()) }).await;
        }
        assert_eq!(b.state(), CircuitState::Open);

        let rejected = b.call(|| async { Ok::<u32, String>(1) }).await;
        assert_eq!(
            rejected.unwrap_err(),
            BreakerError::Open {
                provider: "openai".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_state_changes_are_published() {
        let audit = Arc::new(MemoryAuditSink::new());
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let b = CircuitBreaker::new("anthropic", BreakerConfig::new().with_failure_threshold(1), audit)
            .unwrap()
            .with_event_bus(bus);

        b.record_failure();

        match rx.recv().await.unwrap() {
            BusEvent::CircuitStateChanged { provider, from, to, .. } => {
                assert_eq!(provider, "anthropic");
                assert_eq!(from, "closed");
                assert_eq!(to, "open");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
