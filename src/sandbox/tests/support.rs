//! Shared fixtures for sandbox service tests.

use crate::config::GatewayConfig;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

/// Clock that only moves when a test advances it.
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 1, 15, 9, 30, 0)
            .single()
            .expect("valid fixed timestamp");
        Self {
            now: Mutex::new(start),
        }
    }

    pub(super) fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().expect("clock lock");
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Gateway settings with short budgets so timeout paths finish quickly.
pub(super) fn fast_config() -> GatewayConfig {
    GatewayConfig {
        status_freshness_ms: 3_000,
        status_timeout_ms: 100,
        create_timeout_ms: 100,
        proxy_timeout_ms: 100,
        ..GatewayConfig::default()
    }
}

/// Collects formatted warn and error lines emitted on the current thread.
#[derive(Clone, Default)]
pub(super) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Routes this thread's events into the buffer until the guard drops.
    pub(super) fn install(&self) -> DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Returns captured lines that carry `alert=true`.
    pub(super) fn alerts(&self) -> Vec<String> {
        let buffer = self.buffer.lock().expect("log buffer lock");
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| line.contains("alert=true"))
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .expect("log buffer lock")
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
