//! Domain model for sandbox orchestration.
//!
//! Identifiers, the observed sandbox state machine, status snapshots, the
//! uniform result envelope, creation configuration, and proxied request
//! shapes. Nothing here performs I/O.

mod config;
mod error;
mod ids;
mod request;
mod result;
mod state;
mod status;

pub use config::{IDEMPOTENCY_CONFIG_KEY, SandboxConfig};
pub use error::{ParseSandboxStateError, SandboxDomainError};
pub use ids::{IdempotencyKey, SandboxId};
pub use request::{
    HttpMethod, ProxyRequest, ProxyResponse, REDACTED, SENSITIVE_HEADERS, redact_headers,
};
pub use result::{
    BODY_KEY, GatewayErrorCode, GatewayResult, HEADERS_KEY, IDEMPOTENCY_KEY_KEY, SANDBOX_ID_KEY,
    STATUS_CODE_KEY,
};
pub use state::SandboxState;
pub use status::{BatchStatusResult, SandboxStatusResult};
