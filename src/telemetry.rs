//! Structured logging setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, e.g. `info` or `caisson=debug`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Whether to emit ANSI colours in text mode.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Builds the filter, preferring `RUST_LOG` when it is set and valid.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global tracing subscriber.
///
/// Returns `false` when a subscriber was already installed, which makes the
/// call safe to repeat from tests.
#[must_use]
pub fn init_tracing(config: &LogConfig) -> bool {
    let layer = fmt::layer().with_target(true);
    let formatted = match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.with_ansi(config.ansi).boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(formatted)
        .try_init()
        .is_ok()
}
