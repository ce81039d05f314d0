//! Shared test helpers for in-memory integration tests.

use caisson::config::{GatewayConfig, SchedulerConfig};
use caisson::sandbox::{adapters::InMemorySandboxProvider, services::ProviderGateway};
use caisson::task::{
    adapters::memory::{InMemoryTaskFileRepository, InMemoryTaskRepository},
    domain::{DataIsolation, NewTask, TaskId, TaskMode, TopicId, WorkspaceId},
    services::{TaskEventBus, TaskLifecycleService, TaskScheduler},
};
use chrono::TimeDelta;
use crate::test_helpers::ManualClock;
use rstest::fixture;
use std::sync::Arc;

/// Gateway over the in-memory provider, driven by a manual clock.
pub type MemoryGateway = ProviderGateway<InMemorySandboxProvider, ManualClock>;

/// Scheduler wired to in-memory adapters.
pub type MemoryScheduler = TaskScheduler<MemoryGateway, InMemoryTaskRepository, ManualClock>;

/// Lifecycle service wired to in-memory adapters.
pub type MemoryLifecycle =
    TaskLifecycleService<InMemoryTaskRepository, InMemoryTaskFileRepository, ManualClock>;

/// Gateway settings with short budgets and no transport retries.
#[must_use]
pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        status_timeout_ms: 200,
        create_timeout_ms: 200,
        proxy_timeout_ms: 200,
        transport_retries: 0,
        ..GatewayConfig::default()
    }
}

/// Everything an end-to-end test needs, sharing one clock and one store.
pub struct Stack {
    /// Provider the gateway talks to.
    pub provider: InMemorySandboxProvider,
    /// Clock shared by the gateway, tracker, and services.
    pub clock: Arc<ManualClock>,
    /// Gateway under test.
    pub gateway: Arc<MemoryGateway>,
    /// Task store shared by the lifecycle service and scheduler.
    pub tasks: Arc<InMemoryTaskRepository>,
    /// User-facing task operations.
    pub lifecycle: MemoryLifecycle,
    /// Sandbox scheduling.
    pub scheduler: Arc<MemoryScheduler>,
}

impl Stack {
    /// Builds a stack over `provider`.
    #[must_use]
    pub fn over(provider: InMemorySandboxProvider) -> Self {
        let clock = Arc::new(ManualClock::new());
        let gateway = Arc::new(ProviderGateway::new(
            Arc::new(provider.clone()),
            Arc::clone(&clock),
            gateway_config(),
        ));
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let events = Arc::new(TaskEventBus::new());
        let lifecycle = TaskLifecycleService::new(
            Arc::clone(&tasks),
            Arc::new(InMemoryTaskFileRepository::new()),
            Arc::clone(&events),
            Arc::clone(&clock),
        );
        let scheduler = Arc::new(TaskScheduler::new(
            Arc::clone(&gateway),
            Arc::clone(&tasks),
            events,
            Arc::clone(&clock),
            SchedulerConfig {
                poll_interval_ms: 10,
                sandbox_image: "agent-v1".to_owned(),
                ..SchedulerConfig::default()
            },
        ));
        Self {
            provider,
            clock,
            gateway,
            tasks,
            lifecycle,
            scheduler,
        }
    }

    /// Moves the shared clock past the running-status freshness window.
    pub fn expire_cached_status(&self) {
        self.clock.advance(TimeDelta::seconds(4));
    }
}

/// Provides a stack over a provider without native batch support.
#[fixture]
pub fn stack() -> Stack {
    Stack::over(InMemorySandboxProvider::new())
}

/// Parses a task identifier.
///
/// # Errors
///
/// Returns an error when the identifier is blank.
pub fn task_id(value: &str) -> eyre::Result<TaskId> {
    Ok(TaskId::new(value)?)
}

/// Builds a submission request for `task` in workspace `ws-1`.
///
/// # Errors
///
/// Returns an error when any identifier is blank.
pub fn submission(task: &str) -> eyre::Result<NewTask> {
    Ok(NewTask {
        task_id: task_id(task)?,
        isolation: DataIsolation::from_parts("org-1", "user-1")?,
        workspace_id: WorkspaceId::new("ws-1")?,
        topic_id: TopicId::new("topic-1")?,
        prompt: "summarize the incident timeline".to_owned(),
        attachments: Vec::new(),
        work_dir: "/workspace".to_owned(),
        task_mode: TaskMode::Chat,
    })
}
