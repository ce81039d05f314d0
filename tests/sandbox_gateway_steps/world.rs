//! Shared world state for sandbox gateway BDD scenarios.

use std::sync::Arc;

use caisson::config::GatewayConfig;
use caisson::sandbox::{
    adapters::InMemorySandboxProvider,
    domain::{BatchStatusResult, GatewayResult},
    services::ProviderGateway,
};
use crate::test_helpers::ManualClock;
use rstest::fixture;

/// Gateway type used by the BDD world.
pub type TestGateway = ProviderGateway<InMemorySandboxProvider, ManualClock>;

/// Scenario world for sandbox gateway behaviour tests.
pub struct GatewayWorld {
    /// Provider behind the gateway.
    pub provider: InMemorySandboxProvider,
    /// Clock driving status freshness.
    pub clock: Arc<ManualClock>,
    /// The gateway under test.
    pub gateway: TestGateway,
    /// Result of the last create call.
    pub last_created: Option<GatewayResult>,
    /// Result of the last proxied call.
    pub last_proxied: Option<GatewayResult>,
    /// Result of the last batch status call.
    pub last_batch: Option<BatchStatusResult>,
}

impl GatewayWorld {
    /// Creates a world over an empty provider.
    #[must_use]
    pub fn new() -> Self {
        let provider = InMemorySandboxProvider::new();
        let clock = Arc::new(ManualClock::new());
        let gateway = ProviderGateway::new(
            Arc::new(provider.clone()),
            Arc::clone(&clock),
            GatewayConfig {
                transport_retries: 0,
                ..GatewayConfig::aggressive()
            },
        );

        Self {
            provider,
            clock,
            gateway,
            last_created: None,
            last_proxied: None,
            last_batch: None,
        }
    }
}

impl Default for GatewayWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> GatewayWorld {
    GatewayWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
