//! Per-sender token buckets.
//!
//! Buckets refill continuously: `tokens = min(capacity, tokens + elapsed * rate)`.
//! Because refill is a pure function of elapsed time, each bucket only needs
//! its own lock; senders never contend with each other beyond the map shard.
//!
//! The map is bounded. Idle senders are swept on demand and, once the map
//! grows past `max_senders`, automatically; if a sweep does not free enough
//! room the least recently refilled buckets are evicted, down to 90% of the
//! bound.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::SanitizeError;
use crate::Result;

/// Rate-limit settings shared by every sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst size: messages a fresh sender may send back to back.
    pub capacity: u32,
    /// Sustained rate, in messages per second.
    pub refill_per_sec: f64,
    /// A bucket untouched for this many seconds is eligible for eviction.
    pub idle_eviction_secs: u64,
    /// Upper bound on tracked senders.
    pub max_senders: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            refill_per_sec: 0.5,
            idle_eviction_secs: 600,
            max_senders: 10_000,
        }
    }
}

impl RateLimitConfig {
    /// Sets the burst capacity.
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the refill rate.
    pub fn with_refill_per_sec(mut self, rate: f64) -> Self {
        self.refill_per_sec = rate;
        self
    }

    /// Sets the idle eviction age.
    pub fn with_idle_eviction(mut self, idle: Duration) -> Self {
        self.idle_eviction_secs = idle.as_secs();
        self
    }

    /// Sets the sender bound.
    pub fn with_max_senders(mut self, max: usize) -> Self {
        self.max_senders = max;
        self
    }

    /// Idle eviction age as a `Duration`.
    pub fn idle_eviction(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }

    /// Rejects values that would make the limiter meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SanitizeError::Config("rate_limit.capacity must be > 0".into()));
        }
        if !(self.refill_per_sec.is_finite() && self.refill_per_sec > 0.0) {
            return Err(SanitizeError::Config(
                "rate_limit.refill_per_sec must be a positive number".into(),
            ));
        }
        if self.max_senders == 0 {
            return Err(SanitizeError::Config("rate_limit.max_senders must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_sec).min(f64::from(config.capacity));
        self.last_refill = now;
    }

    fn try_consume(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.refill(config, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Concurrent per-sender rate limiter.
pub struct SenderRateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
}

impl SenderRateLimiter {
    /// Creates a limiter with no tracked senders.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Active settings.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consumes one token for `sender`. Returns false when over the limit.
    pub fn check(&self, sender: &str) -> bool {
        self.check_at(sender, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock.
    pub fn check_at(&self, sender: &str, now: Instant) -> bool {
        let allowed = {
            let mut bucket = self
                .buckets
                .entry(sender.to_string())
                .or_insert_with(|| TokenBucket::full(self.config.capacity, now));
            bucket.try_consume(&self.config, now)
        };

        if self.buckets.len() > self.config.max_senders {
            self.enforce_bound(sender, now);
        }
        allowed
    }

    /// Tokens currently available to `sender`, or `None` if untracked.
    pub fn remaining(&self, sender: &str) -> Option<f64> {
        self.buckets.get(sender).map(|b| b.tokens)
    }

    /// Number of tracked senders.
    pub fn tracked_senders(&self) -> usize {
        self.buckets.len()
    }

    /// Evicts buckets idle for longer than the configured age.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    /// [`sweep_idle`](Self::sweep_idle) against an explicit clock.
    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let idle = self.config.idle_eviction();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= idle);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.buckets.len(), "swept idle rate buckets");
        }
        evicted
    }

    /// Sweeps idle buckets, then evicts the least recently refilled ones
    /// down to 90% of `max_senders` so a flood of new senders does not pay
    /// for a scan on every message.
    fn enforce_bound(&self, current: &str, now: Instant) {
        self.sweep_idle_at(now);
        if self.buckets.len() <= self.config.max_senders {
            return;
        }

        let low_water = self.config.max_senders - self.config.max_senders / 10;
        let excess = self.buckets.len().saturating_sub(low_water);

        let mut by_age: Vec<(String, Instant)> = self
            .buckets
            .iter()
            .filter(|entry| entry.key() != current)
            .map(|entry| (entry.key().clone(), entry.value().last_refill))
            .collect();
        if excess < by_age.len() {
            by_age.select_nth_unstable_by_key(excess, |(_, last)| *last);
        }

        for (sender, _) in by_age.into_iter().take(excess) {
            self.buckets.remove(&sender);
        }
        debug!(
            evicted = excess,
            remaining = self.buckets.len(),
            "evicted least recently used rate buckets"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u32, rate: f64) -> SenderRateLimiter {
        SenderRateLimiter::new(
            RateLimitConfig::default()
                .with_capacity(capacity)
                .with_refill_per_sec(rate),
        )
    }

    #[test]
    fn test_burst_then_limited() {
        let limiter = limiter(3, 1.0);
        let now = Instant::now();
        assert!(limiter.check_at("alice", now));
        assert!(limiter.check_at("alice", now));
        assert!(limiter.check_at("alice", now));
        assert!(!limiter.check_at("alice", now));
    }

    #[test]
    fn test_refill_is_continuous() {
        let limiter = limiter(2, 2.0);
        let t0 = Instant::now();
        assert!(limiter.check_at("bob", t0));
        assert!(limiter.check_at("bob", t0));
        assert!(!limiter.check_at("bob", t0));

        // Half a second at 2/s buys exactly one token.
        let t1 = t0 + Duration::from_millis(500);
        assert!(limiter.check_at("bob", t1));
        assert!(!limiter.check_at("bob", t1));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let limiter = limiter(2, 10.0);
        let t0 = Instant::now();
        assert!(limiter.check_at("carol", t0));
        let later = t0 + Duration::from_secs(60);
        assert!(limiter.check_at("carol", later));
        assert!((limiter.remaining("carol").unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_senders_are_independent() {
        let limiter = limiter(1, 0.1);
        let now = Instant::now();
        assert!(limiter.check_at("a", now));
        assert!(!limiter.check_at("a", now));
        assert!(limiter.check_at("b", now));
    }

    #[test]
    fn test_sweep_idle_removes_stale_buckets() {
        let limiter = SenderRateLimiter::new(
            RateLimitConfig::default().with_idle_eviction(Duration::from_secs(10)),
        );
        let t0 = Instant::now();
        limiter.check_at("old", t0);
        limiter.check_at("fresh", t0 + Duration::from_secs(15));

        let evicted = limiter.sweep_idle_at(t0 + Duration::from_secs(16));
        assert_eq!(evicted, 1);
        assert!(limiter.remaining("old").is_none());
        assert!(limiter.remaining("fresh").is_some());
    }

    #[test]
    fn test_max_senders_evicts_least_recent() {
        let limiter = SenderRateLimiter::new(RateLimitConfig::default().with_max_senders(2));
        let t0 = Instant::now();
        limiter.check_at("s1", t0);
        limiter.check_at("s2", t0 + Duration::from_secs(1));
        limiter.check_at("s3", t0 + Duration::from_secs(2));

        assert_eq!(limiter.tracked_senders(), 2);
        assert!(limiter.remaining("s1").is_none());
        assert!(limiter.remaining("s3").is_some());
    }

    #[test]
    fn test_eviction_runs_in_batches() {
        let limiter = SenderRateLimiter::new(RateLimitConfig::default().with_max_senders(20));
        let t0 = Instant::now();
        for i in 0..=20u64 {
            limiter.check_at(&format!("s{i}"), t0 + Duration::from_millis(i));
        }
        // 21 senders trip the bound once and drop to 18.
        assert_eq!(limiter.tracked_senders(), 18);
        assert!(limiter.remaining("s0").is_none());
        assert!(limiter.remaining("s2").is_none());
        assert!(limiter.remaining("s3").is_some());
        assert!(limiter.remaining("s20").is_some());

        // Headroom absorbs the next two newcomers without evicting.
        limiter.check_at("s21", t0 + Duration::from_millis(21));
        limiter.check_at("s22", t0 + Duration::from_millis(22));
        assert_eq!(limiter.tracked_senders(), 20);
        assert!(limiter.remaining("s3").is_some());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        assert!(RateLimitConfig::default().with_capacity(0).validate().is_err());
        assert!(RateLimitConfig::default().with_refill_per_sec(0.0).validate().is_err());
        assert!(RateLimitConfig::default().validate().is_ok());
    }
}
