//! Capability handlers.
//!
//! Handlers are wrapped in a [`ToolHandler`] variant that names their
//! permission category. The registry compares that category with the
//! definition's tier when the handler is bound, so a destructive
//! implementation can never sit behind a definition declared `read`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::cancel::CancelSignal;
use crate::models::PermissionTier;

/// Errors a handler can return.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The handler rejected its input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The handler observed its cancel signal and stopped.
    #[error("cancelled")]
    Cancelled,

    /// The capability was declared in a manifest but never wired up.
    #[error("capability '{0}' has no handler bound")]
    NotImplemented(String),
}

/// An invocable capability implementation.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Runs the capability.
    ///
    /// Implementations should observe `cancel` and return promptly once it
    /// fires.
    async fn invoke(&self, params: Value, cancel: CancelSignal) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`CapabilityHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wraps `f` as a handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value, CancelSignal) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Value, CancelSignal) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn invoke(&self, params: Value, cancel: CancelSignal) -> Result<Value, HandlerError> {
        (self.f)(params, cancel).await
    }
}

/// A handler tagged with its permission category.
#[derive(Clone)]
pub enum ToolHandler {
    Read(Arc<dyn CapabilityHandler>),
    Write(Arc<dyn CapabilityHandler>),
    Destructive(Arc<dyn CapabilityHandler>),
    /// Stand-in for manifest-loaded capabilities. Fails every invocation.
    Placeholder,
}

impl ToolHandler {
    pub fn read(handler: impl CapabilityHandler + 'static) -> Self {
        ToolHandler::Read(Arc::new(handler))
    }

    pub fn write(handler: impl CapabilityHandler + 'static) -> Self {
        ToolHandler::Write(Arc::new(handler))
    }

    pub fn destructive(handler: impl CapabilityHandler + 'static) -> Self {
        ToolHandler::Destructive(Arc::new(handler))
    }

    /// Tier of the wrapped handler, `None` for the placeholder.
    pub fn tier(&self) -> Option<PermissionTier> {
        match self {
            ToolHandler::Read(_) => Some(PermissionTier::Read),
            ToolHandler::Write(_) => Some(PermissionTier::Write),
            ToolHandler::Destructive(_) => Some(PermissionTier::Destructive),
            ToolHandler::Placeholder => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ToolHandler::Placeholder)
    }

    /// Invokes the wrapped handler.
    pub async fn invoke(
        &self,
        tool_id: &str,
        params: Value,
        cancel: CancelSignal,
    ) -> Result<Value, HandlerError> {
        match self {
            ToolHandler::Read(h) | ToolHandler::Write(h) | ToolHandler::Destructive(h) => {
                h.invoke(params, cancel).await
            }
            ToolHandler::Placeholder => {
                error!(tool_id = %tool_id, "invoked capability with no handler bound");
                Err(HandlerError::NotImplemented(tool_id.to_string()))
            }
        }
    }
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tier() {
            Some(tier) => write!(f, "ToolHandler::{}", tier),
            None => f.write_str("ToolHandler::Placeholder"),
        }
    }
}
