//! Opaque sandbox creation configuration.

use super::{IdempotencyKey, SandboxDomainError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Preferred configuration key carrying the idempotency key.
pub const IDEMPOTENCY_CONFIG_KEY: &str = "idempotencyKey";
/// Alternative snake-case spelling accepted for the idempotency key.
const IDEMPOTENCY_CONFIG_KEY_SNAKE: &str = "idempotency_key";

/// Provider-agnostic configuration for a new sandbox.
///
/// The gateway only interprets the idempotency key; resource limits, image
/// references, and environment variables are passed to the provider as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxConfig(Map<String, Value>);

impl SandboxConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxDomainError::ConfigNotAnObject`] when `value` is not a
    /// JSON object.
    pub fn from_value(value: Value) -> Result<Self, SandboxDomainError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(SandboxDomainError::ConfigNotAnObject),
        }
    }

    /// Sets a configuration entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: &IdempotencyKey) -> Self {
        self.0.remove(IDEMPOTENCY_CONFIG_KEY_SNAKE);
        self.0.insert(
            IDEMPOTENCY_CONFIG_KEY.to_owned(),
            Value::String(key.as_str().to_owned()),
        );
        self
    }

    /// Returns the idempotency key, if a non-empty one is present.
    #[must_use]
    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        self.0
            .get(IDEMPOTENCY_CONFIG_KEY)
            .or_else(|| self.0.get(IDEMPOTENCY_CONFIG_KEY_SNAKE))
            .and_then(Value::as_str)
            .and_then(|raw| IdempotencyKey::new(raw).ok())
    }

    /// Returns the image or template reference, if present.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.0.get("image").and_then(Value::as_str)
    }

    /// Returns a configuration entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the configuration as a JSON object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for SandboxConfig {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}
