//! Request forwarding into sandboxes.

use crate::config::GatewayConfig;
use crate::sandbox::{
    domain::{ProxyRequest, ProxyResponse, SandboxId, redact_headers},
    ports::{ProviderError, ProviderResult, SandboxProvider},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

/// Relays requests to a sandbox's internal HTTP surface.
///
/// Requests to the same sandbox pass through a FIFO lane so they are
/// delivered in submission order. Only failures that provably happened
/// before the request left the gateway are retried; HTTP error statuses
/// from inside the sandbox are returned untouched.
pub struct ProxyForwarder<P>
where
    P: SandboxProvider,
{
    provider: Arc<P>,
    config: GatewayConfig,
    lanes: Mutex<HashMap<SandboxId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<P> ProxyForwarder<P>
where
    P: SandboxProvider,
{
    /// Creates a forwarder.
    #[must_use]
    pub fn new(provider: Arc<P>, config: GatewayConfig) -> Self {
        Self {
            provider,
            config,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Forwards `request` to the sandbox and returns its raw response.
    ///
    /// # Errors
    ///
    /// Returns the provider failure of the last attempt, or
    /// [`ProviderError::Timeout`] when an attempt exceeds the proxy budget.
    pub async fn forward(
        &self,
        sandbox_id: &SandboxId,
        request: &ProxyRequest,
    ) -> ProviderResult<ProxyResponse> {
        let lane = self.lane(sandbox_id);
        let _turn = lane.lock().await;

        debug!(
            sandbox_id = %sandbox_id,
            method = %request.method(),
            path = request.path(),
            headers = ?redact_headers(request.headers(), &self.config.redacted_headers),
            "forwarding request to sandbox"
        );

        let started = Instant::now();
        let max_attempts = self.config.proxy_connect_retries.saturating_add(1);
        let mut attempt = 1;
        let outcome = loop {
            match self.attempt(sandbox_id, request).await {
                Err(err) if err.is_connect() && attempt < max_attempts => {
                    warn!(
                        sandbox_id = %sandbox_id,
                        attempt,
                        error = %err,
                        "retrying proxied request after connection failure"
                    );
                    attempt += 1;
                }
                other => break other,
            }
        };

        match &outcome {
            Ok(response) => debug!(
                sandbox_id = %sandbox_id,
                method = %request.method(),
                path = request.path(),
                status = response.status_code(),
                elapsed_ms = started.elapsed().as_millis(),
                "sandbox responded"
            ),
            Err(err) => warn!(
                sandbox_id = %sandbox_id,
                method = %request.method(),
                path = request.path(),
                attempts = attempt,
                error = %err,
                "proxied request failed"
            ),
        }
        outcome
    }

    /// Drops the ordering lane of a sandbox that will receive no more work.
    pub fn release(&self, sandbox_id: &SandboxId) {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sandbox_id);
    }

    /// Returns the number of sandboxes with an active lane.
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn attempt(
        &self,
        sandbox_id: &SandboxId,
        request: &ProxyRequest,
    ) -> ProviderResult<ProxyResponse> {
        let budget = self.config.proxy_timeout();
        tokio::time::timeout(budget, self.provider.forward(sandbox_id, request))
            .await
            .unwrap_or_else(|_| Err(ProviderError::Timeout(budget)))
    }

    fn lane(&self, sandbox_id: &SandboxId) -> Arc<tokio::sync::Mutex<()>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(lanes.entry(sandbox_id.clone()).or_default())
    }
}
