//! In-memory sandbox provider for tests and local runs.

use crate::sandbox::{
    domain::{
        HttpMethod, IdempotencyKey, ProxyRequest, ProxyResponse, SandboxConfig, SandboxId,
        SandboxState,
    },
    ports::{ObservedState, ProviderError, ProviderResult, SandboxProvider},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::{Clock, DefaultClock};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Default de-duplication window for idempotency keys.
const DEFAULT_IDEMPOTENCY_WINDOW: TimeDelta = TimeDelta::minutes(10);

/// Number of calls received per provider operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCallCounts {
    /// `create` calls.
    pub create: usize,
    /// `status` calls.
    pub status: usize,
    /// `batch_status` calls.
    pub batch_status: usize,
    /// `forward` calls.
    pub forward: usize,
}

/// In-memory sandbox provider.
///
/// Models sandbox lifecycle without starting any compute: sandboxes start in
/// `Pending`, become `Running` through [`InMemorySandboxProvider::mark_running`],
/// and can be made unhealthy, stopped, or evicted. Failures and latency can be
/// scripted to exercise retry and timeout paths. Idempotency windows are
/// measured with the injected clock.
#[derive(Clone)]
pub struct InMemorySandboxProvider {
    state: Arc<RwLock<InMemoryProviderState>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl Default for InMemorySandboxProvider {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            clock: Arc::new(DefaultClock),
        }
    }
}

impl fmt::Debug for InMemorySandboxProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySandboxProvider")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct InMemoryProviderState {
    sandboxes: HashMap<SandboxId, SimulatedSandbox>,
    idempotency: HashMap<IdempotencyKey, (SandboxId, DateTime<Utc>)>,
    idempotency_window: Option<TimeDelta>,
    queued_ids: VecDeque<SandboxId>,
    next_sequence: u64,
    create_failures: VecDeque<ProviderError>,
    status_failures: VecDeque<ProviderError>,
    forward_failures: VecDeque<ProviderError>,
    responders: HashMap<(HttpMethod, String), ProxyResponse>,
    calls: ProviderCallCounts,
    batch_sizes: Vec<usize>,
    batch_limit: Option<usize>,
    latency: Duration,
}

#[derive(Debug, Clone)]
struct SimulatedSandbox {
    state: SandboxState,
    detail: Option<String>,
    config: SandboxConfig,
    received: Vec<ProxyRequest>,
}

impl InMemorySandboxProvider {
    /// Creates a provider without native batch support.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables native batch status calls of up to `limit` ids.
    #[must_use]
    pub fn with_batch_limit(self, limit: usize) -> Self {
        self.write().batch_limit = Some(limit);
        self
    }

    /// Delays every provider call by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.write().latency = latency;
        self
    }

    /// Measures idempotency windows with `clock` instead of the system clock.
    ///
    /// Applies to this handle and to clones made from it afterwards.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Overrides how long idempotency keys are remembered.
    #[must_use]
    pub fn with_idempotency_window(self, window: TimeDelta) -> Self {
        self.write().idempotency_window = Some(window);
        self
    }

    /// Queues the identifier assigned to the next created sandbox.
    pub fn queue_sandbox_id(&self, sandbox_id: impl Into<SandboxId>) {
        self.write().queued_ids.push_back(sandbox_id.into());
    }

    /// Marks a sandbox as ready.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the sandbox does not exist.
    pub fn mark_running(&self, sandbox_id: &SandboxId) -> ProviderResult<()> {
        self.set_state(sandbox_id, SandboxState::Running, None)
    }

    /// Marks a sandbox as failing health checks.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the sandbox does not exist.
    pub fn mark_unhealthy(
        &self,
        sandbox_id: &SandboxId,
        detail: impl Into<String>,
    ) -> ProviderResult<()> {
        self.set_state(sandbox_id, SandboxState::Unhealthy, Some(detail.into()))
    }

    /// Stops a sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the sandbox does not exist.
    pub fn stop(&self, sandbox_id: &SandboxId) -> ProviderResult<()> {
        self.set_state(sandbox_id, SandboxState::Stopped, None)
    }

    /// Garbage-collects a sandbox so the provider no longer knows it.
    ///
    /// Returns `true` when the sandbox existed.
    pub fn evict(&self, sandbox_id: &SandboxId) -> bool {
        self.write().sandboxes.remove(sandbox_id).is_some()
    }

    /// Makes the next `create` call fail with `error`.
    pub fn fail_next_create(&self, error: ProviderError) {
        self.write().create_failures.push_back(error);
    }

    /// Makes the next `status` or `batch_status` call fail with `error`.
    pub fn fail_next_status(&self, error: ProviderError) {
        self.write().status_failures.push_back(error);
    }

    /// Makes the next `forward` call fail with `error`.
    pub fn fail_next_forward(&self, error: ProviderError) {
        self.write().forward_failures.push_back(error);
    }

    /// Registers the response returned for `method` and `path`.
    ///
    /// Unregistered routes answer `200` with an echo of the request.
    pub fn respond(&self, method: HttpMethod, path: impl Into<String>, response: ProxyResponse) {
        self.write().responders.insert((method, path.into()), response);
    }

    /// Returns how many calls each operation received.
    #[must_use]
    pub fn calls(&self) -> ProviderCallCounts {
        self.read().calls
    }

    /// Returns the number of ids in each native batch call, in call order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.read().batch_sizes.clone()
    }

    /// Returns the number of sandboxes not stopped or evicted.
    #[must_use]
    pub fn live_sandbox_count(&self) -> usize {
        self.read()
            .sandboxes
            .values()
            .filter(|sandbox| !sandbox.state.is_terminal())
            .count()
    }

    /// Returns the configuration a sandbox was created with.
    #[must_use]
    pub fn config_of(&self, sandbox_id: &SandboxId) -> Option<SandboxConfig> {
        self.read()
            .sandboxes
            .get(sandbox_id)
            .map(|sandbox| sandbox.config.clone())
    }

    /// Returns the requests a sandbox received, in delivery order.
    #[must_use]
    pub fn received_requests(&self, sandbox_id: &SandboxId) -> Vec<ProxyRequest> {
        self.read()
            .sandboxes
            .get(sandbox_id)
            .map(|sandbox| sandbox.received.clone())
            .unwrap_or_default()
    }

    fn set_state(
        &self,
        sandbox_id: &SandboxId,
        state: SandboxState,
        detail: Option<String>,
    ) -> ProviderResult<()> {
        let mut guard = self.write();
        let sandbox = guard
            .sandboxes
            .get_mut(sandbox_id)
            .ok_or_else(|| ProviderError::NotFound(sandbox_id.clone()))?;
        sandbox.state = state;
        sandbox.detail = detail;
        Ok(())
    }

    async fn simulate_latency(&self) {
        let latency = self.read().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryProviderState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryProviderState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InMemoryProviderState {
    fn allocate_id(&mut self) -> SandboxId {
        if let Some(queued) = self.queued_ids.pop_front() {
            return queued;
        }
        self.next_sequence = self.next_sequence.saturating_add(1);
        SandboxId::new(format!("sbx-{:06}", self.next_sequence))
    }

    fn observe(&self, sandbox_id: &SandboxId) -> Option<ObservedState> {
        self.sandboxes.get(sandbox_id).map(|sandbox| ObservedState {
            state: sandbox.state,
            detail: sandbox.detail.clone(),
        })
    }
}

#[async_trait]
impl SandboxProvider for InMemorySandboxProvider {
    async fn create(&self, config: &SandboxConfig) -> ProviderResult<SandboxId> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.calls.create += 1;
        if let Some(error) = state.create_failures.pop_front() {
            return Err(error);
        }

        let now = self.clock.utc();
        let window = state
            .idempotency_window
            .unwrap_or(DEFAULT_IDEMPOTENCY_WINDOW);
        let key = config.idempotency_key();
        if let Some(existing) = key.as_ref().and_then(|k| state.idempotency.get(k)) {
            let (sandbox_id, created_at) = existing;
            if now.signed_duration_since(*created_at) <= window {
                return Ok(sandbox_id.clone());
            }
        }

        let sandbox_id = state.allocate_id();
        state.sandboxes.insert(
            sandbox_id.clone(),
            SimulatedSandbox {
                state: SandboxState::Pending,
                detail: None,
                config: config.clone(),
                received: Vec::new(),
            },
        );
        if let Some(idempotency_key) = key {
            state
                .idempotency
                .insert(idempotency_key, (sandbox_id.clone(), now));
        }
        Ok(sandbox_id)
    }

    async fn status(&self, sandbox_id: &SandboxId) -> ProviderResult<ObservedState> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.calls.status += 1;
        if let Some(error) = state.status_failures.pop_front() {
            return Err(error);
        }
        state
            .observe(sandbox_id)
            .ok_or_else(|| ProviderError::NotFound(sandbox_id.clone()))
    }

    async fn batch_status(
        &self,
        sandbox_ids: &[SandboxId],
    ) -> ProviderResult<HashMap<SandboxId, ObservedState>> {
        self.simulate_latency().await;
        let mut state = self.write();
        let Some(limit) = state.batch_limit else {
            return Err(ProviderError::Unsupported("batch_status"));
        };
        state.calls.batch_status += 1;
        state.batch_sizes.push(sandbox_ids.len());
        if let Some(error) = state.status_failures.pop_front() {
            return Err(error);
        }
        if sandbox_ids.len() > limit {
            return Err(ProviderError::Rejected(format!(
                "batch of {} ids exceeds limit {limit}",
                sandbox_ids.len()
            )));
        }

        Ok(sandbox_ids
            .iter()
            .filter_map(|id| state.observe(id).map(|observed| (id.clone(), observed)))
            .collect())
    }

    async fn forward(
        &self,
        sandbox_id: &SandboxId,
        request: &ProxyRequest,
    ) -> ProviderResult<ProxyResponse> {
        self.simulate_latency().await;
        let mut guard = self.write();
        let state = &mut *guard;
        state.calls.forward += 1;
        if let Some(error) = state.forward_failures.pop_front() {
            return Err(error);
        }

        let sandbox = state
            .sandboxes
            .get_mut(sandbox_id)
            .ok_or_else(|| ProviderError::NotFound(sandbox_id.clone()))?;
        if sandbox.state != SandboxState::Running {
            return Err(ProviderError::Connect(format!(
                "sandbox {sandbox_id} refused connection in state {}",
                sandbox.state
            )));
        }
        sandbox.received.push(request.clone());

        let response = state
            .responders
            .get(&(request.method(), request.path().to_owned()))
            .cloned()
            .unwrap_or_else(|| {
                ProxyResponse::new(
                    200,
                    json!({
                        "method": request.method().as_str(),
                        "path": request.path(),
                        "data": request.data(),
                    }),
                )
            });
        Ok(response)
    }

    fn batch_limit(&self) -> Option<usize> {
        self.read().batch_limit
    }
}
