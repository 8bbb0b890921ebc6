//! One breaker per provider.

use std::collections::HashMap;
use std::sync::Arc;

use bulwark_audit::{AuditSink, EventBus};
use parking_lot::RwLock;
use tracing::debug;

use crate::breaker::{BreakerStats, CircuitBreaker};
use crate::config::BreakerConfig;
use crate::error::Result;

/// Owned store of breakers, keyed by provider name.
///
/// Each provider gets an independent breaker; a failing provider never
/// affects another provider's state.
pub struct BreakerSet {
    config: BreakerConfig,
    audit: Arc<dyn AuditSink>,
    bus: Option<Arc<EventBus>>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerSet {
    /// Creates an empty set. New breakers share `config`.
    pub fn new(config: BreakerConfig, audit: Arc<dyn AuditSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            audit,
            bus: None,
            breakers: RwLock::new(HashMap::new()),
        })
    }

    /// Publishes state changes of every breaker on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Creates breakers for `providers` up front.
    pub fn with_providers<I, S>(self, providers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for provider in providers {
            self.get_or_create(provider)?;
        }
        Ok(self)
    }

    /// Returns the breaker for `provider`, if one exists.
    pub fn get(&self, provider: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(provider).cloned()
    }

    /// Returns the breaker for `provider`, creating it on first use.
    pub fn get_or_create(&self, provider: impl Into<String>) -> Result<Arc<CircuitBreaker>> {
        let provider = provider.into();
        if let Some(existing) = self.get(&provider) {
            return Ok(existing);
        }

        let mut breakers = self.breakers.write();
        if let Some(existing) = breakers.get(&provider) {
            return Ok(existing.clone());
        }
        let mut breaker = CircuitBreaker::new(provider.clone(), self.config, self.audit.clone())?;
        if let Some(bus) = &self.bus {
            breaker = breaker.with_event_bus(bus.clone());
        }
        let breaker = Arc::new(breaker);
        breakers.insert(provider.clone(), breaker.clone());
        debug!(provider = %provider, "circuit breaker created");
        Ok(breaker)
    }

    /// Sorted provider names.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every breaker, sorted by provider.
    pub fn stats(&self) -> Vec<BreakerStats> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        let mut stats: Vec<BreakerStats> = breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.provider.cmp(&b.provider));
        stats
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}
