//! Runtime configuration for the gateway, the scheduler, and the binary.
//!
//! Every value has a default so a partial TOML document is enough. Durations
//! are expressed in milliseconds to keep the file format dependency-free.
//!
//! # Examples
//!
//! ```
//! use caisson::config::AppConfig;
//!
//! let config = AppConfig::from_toml_str(
//!     r#"
//!     database_url = "postgres://localhost/caisson"
//!
//!     [provider]
//!     base_url = "http://sandbox-manager:8080"
//!
//!     [gateway]
//!     status_freshness_ms = 1500
//!     "#,
//! )
//! .expect("valid configuration");
//!
//! assert_eq!(config.gateway.status_freshness().as_millis(), 1500);
//! assert_eq!(config.gateway.status_timeout().as_secs(), 5);
//! ```

use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`AppConfig::database_url`].
pub const DATABASE_URL_ENV: &str = "CAISSON_DATABASE_URL";
/// Environment variable overriding [`ProviderSettings::base_url`].
pub const PROVIDER_URL_ENV: &str = "CAISSON_PROVIDER_URL";
/// Environment variable overriding [`ProviderSettings::api_token`].
pub const PROVIDER_TOKEN_ENV: &str = "CAISSON_PROVIDER_TOKEN";
/// Environment variable overriding [`LogConfig::level`].
pub const LOG_LEVEL_ENV: &str = "CAISSON_LOG_LEVEL";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration document is not valid TOML for [`AppConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Tuning knobs for gateway timeouts, retries, and caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// How long a cached `Running` status is trusted.
    pub status_freshness_ms: u64,
    /// Upper bound for one status resolution, retries included.
    pub status_timeout_ms: u64,
    /// Upper bound for one sandbox creation, retries included.
    pub create_timeout_ms: u64,
    /// Upper bound for one proxied request attempt.
    pub proxy_timeout_ms: u64,
    /// Extra attempts after a transport failure on create and status calls.
    pub transport_retries: u32,
    /// Extra attempts after a connect failure on proxied calls.
    pub proxy_connect_retries: u32,
    /// Rejections of the same idempotency key that raise an alert.
    pub rejection_alert_threshold: u32,
    /// How long cached statuses and rejection counts are kept after their
    /// last update.
    pub cache_retention_ms: u64,
    /// Additional header names redacted from logs.
    pub redacted_headers: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            status_freshness_ms: 3_000,
            status_timeout_ms: 5_000,
            create_timeout_ms: 30_000,
            proxy_timeout_ms: 60_000,
            transport_retries: 1,
            proxy_connect_retries: 1,
            rejection_alert_threshold: 2,
            cache_retention_ms: 600_000,
            redacted_headers: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Creates a configuration with short timeouts.
    ///
    /// Useful for tests and local runs against an in-process provider.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            status_freshness_ms: 250,
            status_timeout_ms: 200,
            create_timeout_ms: 500,
            proxy_timeout_ms: 500,
            ..Self::default()
        }
    }

    /// Returns the cache freshness window for `Running` statuses.
    #[must_use]
    pub const fn status_freshness(&self) -> Duration {
        Duration::from_millis(self.status_freshness_ms)
    }

    /// Returns the status resolution budget.
    #[must_use]
    pub const fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    /// Returns the create budget shared by all attempts.
    #[must_use]
    pub const fn create_timeout(&self) -> Duration {
        Duration::from_millis(self.create_timeout_ms)
    }

    /// Returns how long idle cache entries are retained.
    #[must_use]
    pub const fn cache_retention(&self) -> Duration {
        Duration::from_millis(self.cache_retention_ms)
    }

    /// Returns the per-attempt proxy budget.
    #[must_use]
    pub const fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("gateway.status_timeout_ms", self.status_timeout_ms)?;
        ensure_positive("gateway.create_timeout_ms", self.create_timeout_ms)?;
        ensure_positive("gateway.proxy_timeout_ms", self.proxy_timeout_ms)?;
        ensure_positive("gateway.cache_retention_ms", self.cache_retention_ms)
    }
}

/// Tuning knobs for the task scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay between status polls of one task worker.
    pub poll_interval_ms: u64,
    /// Image reference placed in every sandbox configuration.
    pub sandbox_image: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            sandbox_image: "agent-v1".to_owned(),
        }
    }
}

impl SchedulerConfig {
    /// Returns the worker poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Connection settings for the HTTP sandbox provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL of the sandbox-manager API.
    pub base_url: String,
    /// Bearer token sent to the sandbox manager.
    pub api_token: Option<String>,
    /// TCP connect timeout.
    pub connect_timeout_ms: u64,
    /// Ids per native batch status call; `None` disables batching.
    pub batch_limit: Option<usize>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_owned(),
            api_token: None,
            connect_timeout_ms: 2_000,
            batch_limit: Some(100),
        }
    }
}

impl ProviderSettings {
    /// Returns the TCP connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Complete configuration of the `caisson` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `PostgreSQL` connection URL for task persistence.
    pub database_url: String,
    /// Sandbox provider connection settings.
    pub provider: ProviderSettings,
    /// Gateway tuning.
    pub gateway: GatewayConfig,
    /// Scheduler tuning.
    pub scheduler: SchedulerConfig,
    /// Log output settings.
    pub logging: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/caisson".to_owned(),
            provider: ProviderSettings::default(),
            gateway: GatewayConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for unusable values.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, applies environment overrides, and validates.
    ///
    /// # Errors
    ///
    /// Returns read, parse, or validation errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&document)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Replaces values with the `CAISSON_*` environment variables that are
    /// set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = non_empty_env(DATABASE_URL_ENV) {
            self.database_url = value;
        }
        if let Some(value) = non_empty_env(PROVIDER_URL_ENV) {
            self.provider.base_url = value;
        }
        if let Some(value) = non_empty_env(PROVIDER_TOKEN_ENV) {
            self.provider.api_token = Some(value);
        }
        if let Some(value) = non_empty_env(LOG_LEVEL_ENV) {
            self.logging.level = value;
        }
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "database_url",
                reason: "must not be empty".to_owned(),
            });
        }

        let base_url = self.provider.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "provider.base_url",
                reason: format!("expected an http(s) URL, got '{base_url}'"),
            });
        }
        if self.provider.batch_limit == Some(0) {
            return Err(ConfigError::Invalid {
                field: "provider.batch_limit",
                reason: "must be positive when set".to_owned(),
            });
        }

        self.gateway.validate()?;
        ensure_positive("scheduler.poll_interval_ms", self.scheduler.poll_interval_ms)
    }
}

fn ensure_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_owned(),
        });
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
