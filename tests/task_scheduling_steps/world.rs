//! Shared world state for task scheduling BDD scenarios.

use std::sync::Arc;

use caisson::config::{GatewayConfig, SchedulerConfig};
use caisson::sandbox::{
    adapters::InMemorySandboxProvider, domain::SandboxId, services::ProviderGateway,
};
use caisson::task::{
    adapters::memory::{InMemoryTaskFileRepository, InMemoryTaskRepository},
    domain::{DataIsolation, NewTask, Task, TaskId, TaskMode, TopicId, WorkspaceId},
    ports::TaskRepository,
    services::{TaskEventBus, TaskLifecycleError, TaskLifecycleService, TaskScheduler},
};
use crate::test_helpers::ManualClock;
use eyre::WrapErr;
use rstest::fixture;

type WorldGateway = ProviderGateway<InMemorySandboxProvider, ManualClock>;

/// Scheduler type used by the BDD world.
pub type WorldScheduler = TaskScheduler<WorldGateway, InMemoryTaskRepository, ManualClock>;

/// Lifecycle service type used by the BDD world.
pub type WorldLifecycle =
    TaskLifecycleService<InMemoryTaskRepository, InMemoryTaskFileRepository, ManualClock>;

/// Scenario world for task scheduling behaviour tests.
pub struct SchedulingWorld {
    /// Provider behind the gateway.
    pub provider: InMemorySandboxProvider,
    /// Clock shared by the gateway and services.
    pub clock: Arc<ManualClock>,
    /// Task store shared by both services.
    pub tasks: Arc<InMemoryTaskRepository>,
    /// User-facing task operations.
    pub lifecycle: WorldLifecycle,
    /// The scheduler under test.
    pub scheduler: WorldScheduler,
    /// Result of the last cancellation.
    pub last_cancel: Option<Result<Task, TaskLifecycleError>>,
}

impl SchedulingWorld {
    /// Creates a world with no tasks and an empty provider.
    #[must_use]
    pub fn new() -> Self {
        let provider = InMemorySandboxProvider::new();
        let clock = Arc::new(ManualClock::new());
        let gateway = Arc::new(ProviderGateway::new(
            Arc::new(provider.clone()),
            Arc::clone(&clock),
            GatewayConfig {
                transport_retries: 0,
                ..GatewayConfig::default()
            },
        ));
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let events = Arc::new(TaskEventBus::new());
        let lifecycle = TaskLifecycleService::new(
            Arc::clone(&tasks),
            Arc::new(InMemoryTaskFileRepository::new()),
            Arc::clone(&events),
            Arc::clone(&clock),
        );
        let scheduler = TaskScheduler::new(
            gateway,
            Arc::clone(&tasks),
            events,
            Arc::clone(&clock),
            SchedulerConfig::default(),
        );

        Self {
            provider,
            clock,
            tasks,
            lifecycle,
            scheduler,
            last_cancel: None,
        }
    }

    /// Loads a stored task.
    ///
    /// # Errors
    ///
    /// Returns an error when the identifier is blank or the task is unknown.
    pub fn stored(&self, task: &str) -> Result<Task, eyre::Report> {
        let task_id = TaskId::new(task).wrap_err("parse task id")?;
        run_async(self.tasks.get_by_task_id(&task_id))
            .wrap_err("load task")?
            .ok_or_else(|| eyre::eyre!("task {task} is not stored"))
    }

    /// Returns the sandbox bound to a stored task.
    ///
    /// # Errors
    ///
    /// Returns an error when the task is unknown or has no sandbox.
    pub fn sandbox_of(&self, task: &str) -> Result<SandboxId, eyre::Report> {
        self.stored(task)?
            .sandbox_id()
            .cloned()
            .ok_or_else(|| eyre::eyre!("task {task} has no sandbox"))
    }
}

impl Default for SchedulingWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SchedulingWorld {
    SchedulingWorld::default()
}

/// Builds a chat-mode submission for `task` in workspace `ws-1`.
///
/// # Errors
///
/// Returns an error when any identifier is blank.
pub fn submission(task: &str) -> Result<NewTask, eyre::Report> {
    Ok(NewTask {
        task_id: TaskId::new(task)?,
        isolation: DataIsolation::from_parts("org-1", "user-1")?,
        workspace_id: WorkspaceId::new("ws-1")?,
        topic_id: TopicId::new("topic-1")?,
        prompt: "draft the release notes".to_owned(),
        attachments: Vec::new(),
        work_dir: "/workspace".to_owned(),
        task_mode: TaskMode::Chat,
    })
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
