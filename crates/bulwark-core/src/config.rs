//! Configuration file for Bulwark.
//!
//! Every section is optional; missing sections and keys take their
//! component defaults.
//!
//! ```toml
//! providers = ["openai", "anthropic"]
//!
//! [breaker]
//! failure_threshold = 3
//!
//! [governor.thresholds]
//! auto_approve = 0.02
//!
//! [registry]
//! unknown_parameters = "reject"
//! manifest = "capabilities.toml"
//!
//! [policy]
//! allowed_agents = ["planner", "writer"]
//! token_ttl_secs = 30
//!
//! [executor]
//! max_concurrent = 4
//!
//! [storage]
//! ledger_path = "./bulwark_ledger.db"
//! audit_log = "./audit.jsonl"
//! ```

use std::path::{Path, PathBuf};

use bulwark_breaker::BreakerConfig;
use bulwark_council::GovernorConfig;
use bulwark_executor::ExecutorConfig;
use bulwark_policy::PolicyConfig;
use bulwark_registry::UnknownParameterPolicy;
use bulwark_sanitizer::SanitizerConfig;
use serde::{Deserialize, Serialize};

use crate::error::BulwarkError;
use crate::Result;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulwarkConfig {
    /// Providers whose breakers are created at startup. Others are
    /// created on first use.
    pub providers: Vec<String>,

    pub sanitizer: SanitizerConfig,

    pub breaker: BreakerConfig,

    pub governor: GovernorConfig,

    pub registry: RegistryConfig,

    pub policy: PolicyConfig,

    pub executor: ExecutorConfig,

    pub storage: StorageConfig,
}

/// Tool registry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How parameters absent from a schema are treated.
    pub unknown_parameters: UnknownParameterPolicy,

    /// Capability manifest loaded at startup (`.json` or `.toml`).
    pub manifest: Option<PathBuf>,
}

/// Where durable state lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Used-token ledger. A temporary ledger is used when absent, so
    /// single-use does not survive a restart.
    pub ledger_path: Option<PathBuf>,

    /// Append-only JSON Lines audit log.
    pub audit_log: Option<PathBuf>,
}

impl BulwarkConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BulwarkError::Config(e.to_string()))
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: SanitizerConfig) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_governor(mut self, governor: GovernorConfig) -> Self {
        self.governor = governor;
        self
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.ledger_path = Some(path.into());
        self
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// [`BulwarkError::Config`] naming the first offending section.
    pub fn validate(&self) -> Result<()> {
        fn section<E: std::fmt::Display>(name: &str, r: std::result::Result<(), E>) -> Result<()> {
            r.map_err(|e| BulwarkError::Config(format!("[{name}] {e}")))
        }

        if let Some(empty) = self.providers.iter().find(|p| p.trim().is_empty()) {
            return Err(BulwarkError::Config(format!("provider name '{empty}' is blank")));
        }
        section("sanitizer", self.sanitizer.validate())?;
        section("breaker", self.breaker.validate())?;
        section("governor", self.governor.validate())?;
        section("policy", self.policy.validate())?;
        section("executor", self.executor.validate())?;
        Ok(())
    }
}
