//! Uniform result envelope returned by gateway operations.

use super::{ProxyResponse, SandboxId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Data key holding the identifier of a created sandbox.
pub const SANDBOX_ID_KEY: &str = "sandbox_id";
/// Data key holding the idempotency key used for creation.
pub const IDEMPOTENCY_KEY_KEY: &str = "idempotency_key";
/// Data key holding the HTTP status of a proxied response.
pub const STATUS_CODE_KEY: &str = "status_code";
/// Data key holding the body of a proxied response.
pub const BODY_KEY: &str = "body";
/// Data key holding the headers of a proxied response.
pub const HEADERS_KEY: &str = "headers";

/// Classification of an expected gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// Connection refused, reset, or timed out.
    TransportError,
    /// The provider refused the request (quota, invalid configuration).
    ProviderRejected,
    /// The sandbox does not exist or is known to be gone.
    SandboxNotFound,
    /// The sandbox's own HTTP surface answered with an error status.
    UpstreamError,
}

impl GatewayErrorCode {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransportError => "transport_error",
            Self::ProviderRejected => "provider_rejected",
            Self::SandboxNotFound => "sandbox_not_found",
            Self::UpstreamError => "upstream_error",
        }
    }

    /// Returns `true` when the same call may succeed if issued again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransportError)
    }
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable outcome of a gateway call.
///
/// Expected failures are encoded here with `success == false` and an error
/// code rather than surfaced as Rust errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResult {
    success: bool,
    data: Map<String, Value>,
    error_code: Option<GatewayErrorCode>,
    error_message: Option<String>,
}

impl GatewayResult {
    /// Creates a successful result carrying `data`.
    #[must_use]
    pub const fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            error_code: None,
            error_message: None,
        }
    }

    /// Creates a successful sandbox-creation result.
    #[must_use]
    pub fn created(sandbox_id: &SandboxId, idempotency_key: &str) -> Self {
        let mut data = Map::new();
        data.insert(
            SANDBOX_ID_KEY.to_owned(),
            Value::String(sandbox_id.as_str().to_owned()),
        );
        data.insert(
            IDEMPOTENCY_KEY_KEY.to_owned(),
            Value::String(idempotency_key.to_owned()),
        );
        Self::ok(data)
    }

    /// Creates a failed result without data.
    #[must_use]
    pub fn failure(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self::failure_with_data(code, message, Map::new())
    }

    /// Creates a failed result that still carries data.
    #[must_use]
    pub fn failure_with_data(
        code: GatewayErrorCode,
        message: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            success: false,
            data,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }

    /// Wraps a proxied response.
    ///
    /// Error statuses from the sandbox are passed through verbatim as
    /// [`GatewayErrorCode::UpstreamError`] failures.
    #[must_use]
    pub fn from_proxy_response(response: ProxyResponse) -> Self {
        let status = response.status_code();
        let is_error = response.is_error();
        let data = response.into_data();
        if is_error {
            return Self::failure_with_data(
                GatewayErrorCode::UpstreamError,
                format!("sandbox responded with HTTP {status}"),
                data,
            );
        }
        Self::ok(data)
    }

    /// Returns `true` when the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the result payload.
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Returns the error code of a failed call.
    #[must_use]
    pub const fn error_code(&self) -> Option<GatewayErrorCode> {
        self.error_code
    }

    /// Returns the error message of a failed call.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the created sandbox identifier, if present.
    #[must_use]
    pub fn sandbox_id(&self) -> Option<SandboxId> {
        self.data
            .get(SANDBOX_ID_KEY)
            .and_then(Value::as_str)
            .map(SandboxId::new)
    }

    /// Returns the proxied HTTP status, if present.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.data
            .get(STATUS_CODE_KEY)
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
    }

    /// Returns the proxied response body, if present.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.data.get(BODY_KEY)
    }
}
