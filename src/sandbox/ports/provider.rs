//! Provider port implemented once per sandbox backend.

use crate::sandbox::domain::{
    GatewayErrorCode, ProxyRequest, ProxyResponse, SandboxConfig, SandboxId, SandboxState,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// State and optional detail reported by a provider for one sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedState {
    /// Reported lifecycle state.
    pub state: SandboxState,
    /// Provider-supplied explanation, if any.
    pub detail: Option<String>,
}

impl ObservedState {
    /// Creates an observation without detail.
    #[must_use]
    pub const fn new(state: SandboxState) -> Self {
        Self {
            state,
            detail: None,
        }
    }

    /// Adds a detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Raw capability set of a sandbox backend.
///
/// Implementations perform exactly one provider round trip per call. Retries,
/// timeouts, caching, and result envelopes are layered on top by the gateway
/// services.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Creates a sandbox, de-duplicating on the configuration's idempotency
    /// key for a bounded window.
    async fn create(&self, config: &SandboxConfig) -> ProviderResult<SandboxId>;

    /// Reports the current state of one sandbox.
    async fn status(&self, sandbox_id: &SandboxId) -> ProviderResult<ObservedState>;

    /// Reports the state of several sandboxes in one call.
    ///
    /// Ids absent from the returned map are unknown to the provider. Only
    /// called when [`SandboxProvider::batch_limit`] returns `Some`.
    async fn batch_status(
        &self,
        sandbox_ids: &[SandboxId],
    ) -> ProviderResult<HashMap<SandboxId, ObservedState>>;

    /// Forwards a request to the sandbox's internal HTTP surface.
    ///
    /// Any HTTP status produced inside the sandbox is returned as `Ok`.
    async fn forward(
        &self,
        sandbox_id: &SandboxId,
        request: &ProxyRequest,
    ) -> ProviderResult<ProxyResponse>;

    /// Maximum ids per native batch call, or `None` without batch support.
    fn batch_limit(&self) -> Option<usize>;
}

/// Errors returned by provider adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The connection could not be established; the request was not sent.
    #[error("connection to provider failed: {0}")]
    Connect(String),

    /// The connection failed after the request may have been sent.
    #[error("provider transport failure: {0}")]
    Transport(String),

    /// The call exceeded its time budget.
    #[error("provider call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The provider refused the request.
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    /// The provider does not know the sandbox.
    #[error("sandbox {0} not found")]
    NotFound(SandboxId),

    /// The provider answered with a payload the adapter cannot interpret.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The provider does not implement the operation.
    #[error("operation not supported by provider: {0}")]
    Unsupported(&'static str),
}

impl ProviderError {
    /// Returns the gateway error code the failure is reported as.
    #[must_use]
    pub const fn error_code(&self) -> GatewayErrorCode {
        match self {
            Self::Connect(_) | Self::Transport(_) | Self::Timeout(_) | Self::InvalidResponse(_) => {
                GatewayErrorCode::TransportError
            }
            Self::Rejected(_) | Self::Unsupported(_) => GatewayErrorCode::ProviderRejected,
            Self::NotFound(_) => GatewayErrorCode::SandboxNotFound,
        }
    }

    /// Returns `true` for connection, transport, and timeout failures.
    ///
    /// These are retried once on create and status calls.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Transport(_) | Self::Timeout(_)
        )
    }

    /// Returns `true` when the request provably never reached the provider.
    ///
    /// Only these failures are retried on proxied calls.
    #[must_use]
    pub const fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}
