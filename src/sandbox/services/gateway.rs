//! Provider-backed implementation of the sandbox gateway port.

use super::{ProxyForwarder, StatusTracker};
use crate::config::GatewayConfig;
use crate::sandbox::{
    domain::{
        BatchStatusResult, GatewayErrorCode, GatewayResult, IdempotencyKey, ProxyRequest,
        SandboxConfig, SandboxId, SandboxStatusResult,
    },
    ports::{ProviderError, SandboxGateway, SandboxProvider},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Gateway composed from one [`SandboxProvider`], a [`StatusTracker`], and a
/// [`ProxyForwarder`].
pub struct ProviderGateway<P, C>
where
    P: SandboxProvider,
    C: Clock + Send + Sync,
{
    provider: Arc<P>,
    clock: Arc<C>,
    tracker: StatusTracker<P, C>,
    forwarder: ProxyForwarder<P>,
    config: GatewayConfig,
    rejections: Mutex<HashMap<IdempotencyKey, RejectionTally>>,
}

#[derive(Debug, Clone, Copy)]
struct RejectionTally {
    count: u32,
    last_at: DateTime<Utc>,
}

impl<P, C> ProviderGateway<P, C>
where
    P: SandboxProvider,
    C: Clock + Send + Sync,
{
    /// Creates a gateway over `provider`.
    #[must_use]
    pub fn new(provider: Arc<P>, clock: Arc<C>, config: GatewayConfig) -> Self {
        let tracker = StatusTracker::new(Arc::clone(&provider), Arc::clone(&clock), config.clone());
        let forwarder = ProxyForwarder::new(Arc::clone(&provider), config.clone());
        Self {
            provider,
            clock,
            tracker,
            forwarder,
            config,
            rejections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the status tracker backing this gateway.
    #[must_use]
    pub const fn tracker(&self) -> &StatusTracker<P, C> {
        &self.tracker
    }

    /// Returns the proxy forwarder backing this gateway.
    #[must_use]
    pub const fn forwarder(&self) -> &ProxyForwarder<P> {
        &self.forwarder
    }

    async fn create_with_retry(
        &self,
        config: &SandboxConfig,
        key: &IdempotencyKey,
    ) -> Result<SandboxId, ProviderError> {
        let max_attempts = self.config.transport_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.provider.create(config).await {
                Err(err) if err.is_transport() && attempt < max_attempts => {
                    warn!(
                        idempotency_key = %key,
                        attempt,
                        error = %err,
                        "retrying sandbox creation after transport failure"
                    );
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    fn note_rejection(&self, key: &IdempotencyKey, err: &ProviderError) {
        let now = self.clock.utc();
        let retention = self.config.cache_retention();
        let count = {
            let mut rejections = self.rejections.lock().unwrap_or_else(PoisonError::into_inner);
            rejections.retain(|_, tally| {
                let age = now.signed_duration_since(tally.last_at).to_std();
                !matches!(age, Ok(elapsed) if elapsed > retention)
            });
            let tally = rejections.entry(key.clone()).or_insert(RejectionTally {
                count: 0,
                last_at: now,
            });
            tally.count = tally.count.saturating_add(1);
            tally.last_at = now;
            tally.count
        };

        if count >= self.config.rejection_alert_threshold {
            error!(
                idempotency_key = %key,
                rejections = count,
                alert = true,
                error = %err,
                "provider repeatedly rejected sandbox configuration"
            );
        } else {
            warn!(idempotency_key = %key, error = %err, "provider rejected sandbox configuration");
        }
    }

    /// Returns the number of idempotency keys with recorded rejections.
    #[must_use]
    pub fn tracked_rejections(&self) -> usize {
        self.rejections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn clear_rejections(&self, key: &IdempotencyKey) {
        self.rejections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[async_trait]
impl<P, C> SandboxGateway for ProviderGateway<P, C>
where
    P: SandboxProvider,
    C: Clock + Send + Sync,
{
    async fn create_sandbox(&self, config: SandboxConfig) -> GatewayResult {
        let key = config
            .idempotency_key()
            .unwrap_or_else(IdempotencyKey::generate);
        let effective = config.with_idempotency_key(&key);

        let budget = self.config.create_timeout();
        let outcome = tokio::time::timeout(budget, self.create_with_retry(&effective, &key))
            .await
            .unwrap_or_else(|_| Err(ProviderError::Timeout(budget)));

        match outcome {
            Ok(sandbox_id) => {
                self.clear_rejections(&key);
                info!(sandbox_id = %sandbox_id, idempotency_key = %key, "sandbox created");
                GatewayResult::created(&sandbox_id, key.as_str())
            }
            Err(err) => {
                if matches!(err, ProviderError::Rejected(_)) {
                    self.note_rejection(&key, &err);
                } else {
                    warn!(idempotency_key = %key, error = %err, "sandbox creation failed");
                }
                GatewayResult::failure(err.error_code(), err.to_string())
            }
        }
    }

    async fn get_sandbox_status(&self, sandbox_id: &SandboxId) -> SandboxStatusResult {
        let result = self.tracker.resolve(sandbox_id).await;
        if result.state().is_terminal() {
            self.forwarder.release(sandbox_id);
        }
        result
    }

    async fn get_batch_sandbox_status(&self, sandbox_ids: &[SandboxId]) -> BatchStatusResult {
        let batch = self.tracker.resolve_batch(sandbox_ids).await;
        for result in batch.results().values() {
            if result.state().is_terminal() {
                self.forwarder.release(result.sandbox_id());
            }
        }
        batch
    }

    async fn proxy_sandbox_request(
        &self,
        sandbox_id: &SandboxId,
        request: ProxyRequest,
    ) -> GatewayResult {
        if !sandbox_id.is_well_formed() {
            return GatewayResult::failure(
                GatewayErrorCode::SandboxNotFound,
                format!("malformed sandbox id '{sandbox_id}'"),
            );
        }
        if let Some(state) = self.tracker.known_terminal(sandbox_id) {
            return GatewayResult::failure(
                GatewayErrorCode::SandboxNotFound,
                format!("sandbox {sandbox_id} is {state}; request not forwarded"),
            );
        }

        match self.forwarder.forward(sandbox_id, &request).await {
            Ok(response) => GatewayResult::from_proxy_response(response),
            Err(ProviderError::NotFound(missing)) => {
                self.tracker.record(SandboxStatusResult::not_found(
                    missing.clone(),
                    self.clock.utc(),
                ));
                self.forwarder.release(&missing);
                GatewayResult::failure(
                    GatewayErrorCode::SandboxNotFound,
                    format!("sandbox {missing} not found"),
                )
            }
            Err(err) => GatewayResult::failure(err.error_code(), err.to_string()),
        }
    }
}
