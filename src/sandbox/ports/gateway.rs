//! Gateway port consumed by schedulers and workers.

use crate::sandbox::domain::{
    BatchStatusResult, GatewayResult, ProxyRequest, SandboxConfig, SandboxId, SandboxStatusResult,
};
use async_trait::async_trait;

/// Sole entry point for creating, observing, and talking to sandboxes.
///
/// None of the operations fail with a Rust error: unreachable, missing, or
/// timed-out sandboxes are reported through the returned values. Dropping a
/// returned future cancels the in-flight call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SandboxGateway: Send + Sync {
    /// Creates a sandbox. On success the data carries `sandbox_id`.
    async fn create_sandbox(&self, config: SandboxConfig) -> GatewayResult;

    /// Resolves the current state of one sandbox within a bounded time.
    async fn get_sandbox_status(&self, sandbox_id: &SandboxId) -> SandboxStatusResult;

    /// Resolves the state of several sandboxes; every id is accounted for.
    async fn get_batch_sandbox_status(&self, sandbox_ids: &[SandboxId]) -> BatchStatusResult;

    /// Forwards a request into a sandbox and relays its response.
    async fn proxy_sandbox_request(
        &self,
        sandbox_id: &SandboxId,
        request: ProxyRequest,
    ) -> GatewayResult;
}
