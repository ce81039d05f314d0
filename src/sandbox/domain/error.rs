//! Error types for sandbox domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing sandbox domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxDomainError {
    /// The idempotency key is empty after trimming.
    #[error("idempotency key must not be empty")]
    EmptyIdempotencyKey,

    /// The HTTP method is not one the proxy forwards.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The proxy path is not an absolute, traversal-free path.
    #[error("invalid proxy path '{0}', expected an absolute path without '..' segments")]
    InvalidProxyPath(String),

    /// The sandbox configuration is not a JSON object.
    #[error("sandbox configuration must be a JSON object")]
    ConfigNotAnObject,
}

/// Error returned while parsing sandbox states from provider payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown sandbox state: {0}")]
pub struct ParseSandboxStateError(pub String);
