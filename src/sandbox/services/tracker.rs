//! Status resolution with a short-lived last-known-state cache.

use crate::config::GatewayConfig;
use crate::sandbox::{
    domain::{BatchStatusResult, SandboxId, SandboxState, SandboxStatusResult},
    ports::{ObservedState, ProviderError, ProviderResult, SandboxProvider},
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use mockable::Clock;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, warn};

/// Resolves sandbox states, trusting cached `Running` observations for a
/// freshness window.
///
/// Only `Running` is ever served from cache. Terminal observations are kept so
/// the proxy path can refuse work for sandboxes already known to be gone.
/// Cache writes are last-writer-wins per sandbox id. Entries not updated
/// within the retention window are pruned on the next resolution.
pub struct StatusTracker<P, C>
where
    P: SandboxProvider,
    C: Clock + Send + Sync,
{
    provider: Arc<P>,
    clock: Arc<C>,
    config: GatewayConfig,
    cache: RwLock<HashMap<SandboxId, SandboxStatusResult>>,
}

impl<P, C> StatusTracker<P, C>
where
    P: SandboxProvider,
    C: Clock + Send + Sync,
{
    /// Creates a tracker with an empty cache.
    #[must_use]
    pub fn new(provider: Arc<P>, clock: Arc<C>, config: GatewayConfig) -> Self {
        Self {
            provider,
            clock,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the last recorded status, however old.
    #[must_use]
    pub fn cached(&self, sandbox_id: &SandboxId) -> Option<SandboxStatusResult> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sandbox_id)
            .cloned()
    }

    /// Returns the cached status when it is `Running` and still fresh.
    #[must_use]
    pub fn fresh_running(&self, sandbox_id: &SandboxId) -> Option<SandboxStatusResult> {
        let cached = self.cached(sandbox_id)?;
        let is_fresh = cached.state() == SandboxState::Running
            && self.is_within_freshness(cached.last_observed_at());
        is_fresh.then_some(cached)
    }

    /// Returns the cached state when it is terminal.
    #[must_use]
    pub fn known_terminal(&self, sandbox_id: &SandboxId) -> Option<SandboxState> {
        self.cached(sandbox_id)
            .map(|cached| cached.state())
            .filter(|state| state.is_terminal())
    }

    /// Records an observation and returns the previously cached state.
    ///
    /// A `NotFound` observation for a sandbox cached as `Running` means the
    /// tracker and the provider disagreed and is reported as an alert.
    pub fn record(&self, result: SandboxStatusResult) -> Option<SandboxState> {
        let sandbox_id = result.sandbox_id().clone();
        let next = result.state();
        let previous = self
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sandbox_id.clone(), result)
            .map(|cached| cached.state());

        if let Some(prior) = previous {
            report_transition(&sandbox_id, prior, next);
        }
        previous
    }

    /// Drops any cached status for the sandbox.
    pub fn forget(&self, sandbox_id: &SandboxId) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sandbox_id);
    }

    /// Drops entries last observed before the retention window and returns
    /// how many were removed.
    pub fn prune_expired(&self) -> usize {
        let retention = self.config.cache_retention();
        let now = self.clock.utc();
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|_, cached| {
            let age = now.signed_duration_since(cached.last_observed_at()).to_std();
            !matches!(age, Ok(elapsed) if elapsed > retention)
        });
        let removed = before.saturating_sub(cache.len());
        if removed > 0 {
            debug!(removed, remaining = cache.len(), "pruned expired sandbox statuses");
        }
        removed
    }

    /// Returns the number of cached statuses.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Resolves the current state of one sandbox.
    ///
    /// Never takes longer than the configured status timeout; a query that
    /// exceeds it yields `Unhealthy` with an explanatory detail.
    pub async fn resolve(&self, sandbox_id: &SandboxId) -> SandboxStatusResult {
        self.prune_expired();
        if !sandbox_id.is_well_formed() {
            return SandboxStatusResult::not_found(sandbox_id.clone(), self.clock.utc())
                .with_detail("malformed sandbox id");
        }
        if let Some(cached) = self.fresh_running(sandbox_id) {
            debug!(sandbox_id = %sandbox_id, "serving cached running status");
            return cached;
        }

        let budget = self.config.status_timeout();
        let outcome = tokio::time::timeout(
            budget,
            self.with_transport_retry(sandbox_id.as_str(), || self.provider.status(sandbox_id)),
        )
        .await;
        let observed_at = self.clock.utc();

        match outcome {
            Ok(Ok(observed)) => {
                let result = observed_result(sandbox_id, observed, observed_at);
                self.record(result.clone());
                result
            }
            Ok(Err(ProviderError::NotFound(_))) => {
                let result = SandboxStatusResult::not_found(sandbox_id.clone(), observed_at);
                self.record(result.clone());
                result
            }
            Ok(Err(err)) => {
                warn!(sandbox_id = %sandbox_id, error = %err, "sandbox status unavailable");
                let result = SandboxStatusResult::unhealthy(
                    sandbox_id.clone(),
                    observed_at,
                    err.to_string(),
                );
                self.record_inconclusive(result.clone());
                result
            }
            Err(_) => {
                warn!(
                    sandbox_id = %sandbox_id,
                    timeout_ms = budget.as_millis(),
                    "sandbox status query timed out"
                );
                let result =
                    SandboxStatusResult::timed_out(sandbox_id.clone(), observed_at, budget);
                self.record_inconclusive(result.clone());
                result
            }
        }
    }

    /// Resolves the state of several sandboxes.
    ///
    /// Uses native batch calls chunked to the provider's limit, or parallel
    /// single queries when the provider has no batch support. Every distinct
    /// input id ends up in exactly one of `results` or `failed_ids`.
    pub async fn resolve_batch(&self, sandbox_ids: &[SandboxId]) -> BatchStatusResult {
        self.prune_expired();
        let mut batch = BatchStatusResult::new();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for sandbox_id in sandbox_ids {
            if !seen.insert(sandbox_id) {
                continue;
            }
            if !sandbox_id.is_well_formed() {
                batch.insert(
                    SandboxStatusResult::not_found(sandbox_id.clone(), self.clock.utc())
                        .with_detail("malformed sandbox id"),
                );
            } else if let Some(cached) = self.fresh_running(sandbox_id) {
                batch.insert(cached);
            } else {
                pending.push(sandbox_id.clone());
            }
        }

        if pending.is_empty() {
            return batch;
        }

        let partials = match self.provider.batch_limit() {
            Some(limit) if limit > 0 => {
                join_all(pending.chunks(limit).map(|chunk| self.resolve_chunk(chunk))).await
            }
            _ => join_all(pending.iter().map(|id| self.resolve_member(id))).await,
        };
        for partial in partials {
            batch.merge(partial);
        }
        batch
    }

    async fn resolve_chunk(&self, chunk: &[SandboxId]) -> BatchStatusResult {
        let budget = self.config.status_timeout();
        let outcome = tokio::time::timeout(
            budget,
            self.with_transport_retry("batch", || self.provider.batch_status(chunk)),
        )
        .await;
        let observed_at = self.clock.utc();

        let mut partial = BatchStatusResult::new();
        match outcome {
            Ok(Ok(mut observed)) => {
                for sandbox_id in chunk {
                    let result = observed.remove(sandbox_id).map_or_else(
                        || SandboxStatusResult::not_found(sandbox_id.clone(), observed_at),
                        |state| observed_result(sandbox_id, state, observed_at),
                    );
                    self.record(result.clone());
                    partial.insert(result);
                }
            }
            Ok(Err(ProviderError::Unsupported(_))) => {
                debug!("provider declined batch status; falling back to single queries");
                for member in join_all(chunk.iter().map(|id| self.resolve_member(id))).await {
                    partial.merge(member);
                }
            }
            Ok(Err(err)) => {
                warn!(ids = chunk.len(), error = %err, "batch status chunk failed");
                for sandbox_id in chunk {
                    partial.mark_failed(sandbox_id.clone());
                }
            }
            Err(_) => {
                warn!(
                    ids = chunk.len(),
                    timeout_ms = budget.as_millis(),
                    "batch status chunk timed out"
                );
                for sandbox_id in chunk {
                    partial.mark_failed(sandbox_id.clone());
                }
            }
        }
        partial
    }

    async fn resolve_member(&self, sandbox_id: &SandboxId) -> BatchStatusResult {
        let outcome = tokio::time::timeout(
            self.config.status_timeout(),
            self.with_transport_retry(sandbox_id.as_str(), || self.provider.status(sandbox_id)),
        )
        .await;
        let observed_at = self.clock.utc();

        let mut partial = BatchStatusResult::new();
        match outcome {
            Ok(Ok(observed)) => {
                let result = observed_result(sandbox_id, observed, observed_at);
                self.record(result.clone());
                partial.insert(result);
            }
            Ok(Err(ProviderError::NotFound(_))) => {
                let result = SandboxStatusResult::not_found(sandbox_id.clone(), observed_at);
                self.record(result.clone());
                partial.insert(result);
            }
            Ok(Err(err)) => {
                warn!(sandbox_id = %sandbox_id, error = %err, "batch member status failed");
                partial.mark_failed(sandbox_id.clone());
            }
            Err(_) => {
                warn!(sandbox_id = %sandbox_id, "batch member status timed out");
                partial.mark_failed(sandbox_id.clone());
            }
        }
        partial
    }

    async fn with_transport_retry<T, F, Fut>(
        &self,
        target: &str,
        mut call: F,
    ) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let max_attempts = self.config.transport_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_transport() && attempt < max_attempts => {
                    debug!(
                        target_id = target,
                        attempt,
                        error = %err,
                        "retrying status query after transport failure"
                    );
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    fn record_inconclusive(&self, result: SandboxStatusResult) {
        if self.known_terminal(result.sandbox_id()).is_some() {
            return;
        }
        self.record(result);
    }

    fn is_within_freshness(&self, observed_at: DateTime<Utc>) -> bool {
        let age = self.clock.utc().signed_duration_since(observed_at);
        match age.to_std() {
            Ok(elapsed) => elapsed <= self.config.status_freshness(),
            Err(_) => true,
        }
    }
}

fn observed_result(
    sandbox_id: &SandboxId,
    observed: ObservedState,
    observed_at: DateTime<Utc>,
) -> SandboxStatusResult {
    let mut result = SandboxStatusResult::new(sandbox_id.clone(), observed.state, observed_at);
    if let Some(detail) = observed.detail {
        result = result.with_detail(detail);
    }
    result
}

fn report_transition(sandbox_id: &SandboxId, previous: SandboxState, next: SandboxState) {
    if previous == SandboxState::Running && next == SandboxState::NotFound {
        error!(
            sandbox_id = %sandbox_id,
            alert = true,
            "sandbox reported missing while tracked as running"
        );
        return;
    }
    if previous != next && !previous.can_transition_to(next) {
        warn!(
            sandbox_id = %sandbox_id,
            from = %previous,
            to = %next,
            "unexpected sandbox state transition observed"
        );
    }
}
