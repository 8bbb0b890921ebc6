//! Error types for Bulwark Core.

use thiserror::Error;

/// Core error type.
///
/// Authorization outcomes are not errors; see [`Verdict`](crate::Verdict)
/// and [`ExecutionResult`](bulwark_executor::ExecutionResult).
#[derive(Debug, Error)]
pub enum BulwarkError {
    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid TOML.
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("audit error: {0}")]
    Audit(#[from] bulwark_audit::AuditError),

    /// The message must be treated as untrusted.
    #[error("sanitizer error: {0}")]
    Sanitizer(#[from] bulwark_sanitizer::SanitizeError),

    #[error("breaker error: {0}")]
    Breaker(#[from] bulwark_breaker::BreakerError),

    #[error("registry error: {0}")]
    Registry(#[from] bulwark_registry::RegistryError),

    #[error("council error: {0}")]
    Council(#[from] bulwark_council::CouncilError),

    #[error("policy error: {0}")]
    Policy(#[from] bulwark_policy::PolicyError),

    #[error("executor error: {0}")]
    Executor(#[from] bulwark_executor::ExecutorError),
}
