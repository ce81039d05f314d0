//! Identifier types for the sandbox domain.

use super::SandboxDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest sandbox identifier forwarded to a provider.
const MAX_SANDBOX_ID_LEN: usize = 128;

/// Provider-assigned sandbox identifier.
///
/// Construction never fails: callers hand the gateway whatever identifier
/// they have persisted, and malformed values are resolved to
/// [`super::SandboxState::NotFound`] without contacting a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxId(String);

impl SandboxId {
    /// Creates a sandbox identifier from a raw value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.len() == raw.len() {
            return Self(raw);
        }
        Self(trimmed.to_owned())
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when the identifier may be sent to a provider.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_SANDBOX_ID_LEN
            && self
                .0
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    }
}

impl From<&str> for SandboxId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SandboxId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for SandboxId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied key that de-duplicates sandbox creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates a validated idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxDomainError::EmptyIdempotencyKey`] when the value is
    /// empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, SandboxDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        if normalized.is_empty() {
            return Err(SandboxDomainError::EmptyIdempotencyKey);
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Generates a random idempotency key.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("gw-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the key as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
