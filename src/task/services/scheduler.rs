//! Drives tasks through sandbox assignment, status polling, and proxying.
//!
//! Every status write is a compare-and-set against the status the scheduler
//! read. When another writer got there first, for example a user cancelling
//! the task, the scheduler drops its own transition instead of overwriting.

use super::TaskEventBus;
use crate::config::SchedulerConfig;
use crate::sandbox::{
    domain::{
        GatewayErrorCode, GatewayResult, IdempotencyKey, ProxyRequest, SandboxConfig, SandboxId,
        SandboxState,
    },
    ports::SandboxGateway,
};
use crate::task::{
    domain::{Task, TaskDomainError, TaskEvent, TaskId, TaskStatus, WorkspaceId},
    ports::{TaskRepository, TaskRepositoryError},
};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors returned by scheduler operations.
#[derive(Debug, Error)]
pub enum TaskSchedulerError {
    /// Domain rules rejected the transition.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Task repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
    /// No live task has the identifier.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The operation requires a running task.
    #[error("task {task_id} is {status}, not running")]
    TaskNotRunning {
        /// Task addressed.
        task_id: TaskId,
        /// Its current status.
        status: TaskStatus,
    },
}

/// Result type for scheduler operations.
pub type TaskSchedulerResult<T> = Result<T, TaskSchedulerError>;

/// Effect of one scheduler step on a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerOutcome {
    /// The task was written; carries its persisted state.
    Updated(Task),
    /// Nothing needed to change.
    Unchanged(Task),
    /// Another writer changed the status first; this step was dropped.
    Superseded {
        /// Task addressed.
        task_id: TaskId,
        /// Status found in storage.
        actual: TaskStatus,
    },
}

impl SchedulerOutcome {
    /// Returns the task status after the step.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        match self {
            Self::Updated(task) | Self::Unchanged(task) => task.status(),
            Self::Superseded { actual, .. } => *actual,
        }
    }

    /// Returns the task when the step observed it.
    #[must_use]
    pub const fn task(&self) -> Option<&Task> {
        match self {
            Self::Updated(task) | Self::Unchanged(task) => Some(task),
            Self::Superseded { .. } => None,
        }
    }
}

/// Explicit completion reported by the agent inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionSignal {
    /// The agent finished its work.
    Succeeded,
    /// The agent gave up.
    Failed {
        /// Reason reported by the agent.
        reason: String,
    },
}

/// Tally of one batched poll across active tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Tasks with a sandbox whose status was requested.
    pub polled: usize,
    /// Tasks whose status was written.
    pub updated: usize,
    /// Tasks whose transition lost a compare-and-set race.
    pub superseded: usize,
    /// Sandboxes the gateway could not resolve this round.
    pub unresolved: usize,
}

struct WorkerHandle {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct WorkerRegistry {
    next_generation: u64,
    workers: HashMap<TaskId, WorkerHandle>,
}

/// Task scheduler over one [`SandboxGateway`] and one [`TaskRepository`].
pub struct TaskScheduler<G, R, C>
where
    G: SandboxGateway,
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    gateway: Arc<G>,
    tasks: Arc<R>,
    events: Arc<TaskEventBus>,
    clock: Arc<C>,
    config: SchedulerConfig,
    registry: Mutex<WorkerRegistry>,
}

impl<G, R, C> TaskScheduler<G, R, C>
where
    G: SandboxGateway,
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        gateway: Arc<G>,
        tasks: Arc<R>,
        events: Arc<TaskEventBus>,
        clock: Arc<C>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            gateway,
            tasks,
            events,
            clock,
            config,
            registry: Mutex::new(WorkerRegistry::default()),
        }
    }

    /// Requests a sandbox for a pending task.
    ///
    /// The task id doubles as the idempotency key, so repeating the call after
    /// a crash mid-assignment never creates a second sandbox. Retryable
    /// create failures return the task to `Pending`; others fail it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskSchedulerError::TaskNotFound`] for unknown tasks,
    /// [`TaskSchedulerError::Domain`] when the task is past assignment, and
    /// repository errors when persistence fails.
    pub async fn assign_sandbox(
        &self,
        task_id: &TaskId,
    ) -> TaskSchedulerResult<SchedulerOutcome> {
        let mut task = self.load(task_id).await?;
        if task.sandbox_id().is_some() {
            return Ok(SchedulerOutcome::Unchanged(task));
        }
        if task.status() == TaskStatus::Pending {
            task.begin_sandbox_assignment(&*self.clock)?;
            match self.commit(task, TaskStatus::Pending).await? {
                SchedulerOutcome::Updated(assigning) => task = assigning,
                other => return Ok(other),
            }
        } else if task.status() != TaskStatus::SandboxAssigning {
            return Err(TaskDomainError::InvalidTransition {
                task_id: task_id.clone(),
                from: task.status(),
                to: TaskStatus::SandboxAssigning,
            }
            .into());
        }

        let result = self.gateway.create_sandbox(self.sandbox_config(&task)?).await;
        let created = result.sandbox_id().filter(|_| result.is_success());
        let Some(sandbox_id) = created else {
            return self.handle_create_failure(task, &result).await;
        };

        task.assign_sandbox(sandbox_id.clone(), &*self.clock)?;
        let outcome = self.commit(task, TaskStatus::SandboxAssigning).await?;
        match &outcome {
            SchedulerOutcome::Updated(assigned) => {
                info!(task_id = %task_id, sandbox_id = %sandbox_id, "sandbox assigned");
                self.events
                    .publish(&TaskEvent::SandboxAssigned {
                        task_id: task_id.clone(),
                        sandbox_id,
                        at: assigned.updated_at(),
                    })
                    .await;
            }
            SchedulerOutcome::Superseded { actual, .. } => {
                warn!(
                    task_id = %task_id,
                    sandbox_id = %sandbox_id,
                    status = %actual,
                    "task changed while its sandbox was being created; sandbox left unbound"
                );
            }
            SchedulerOutcome::Unchanged(_) => {}
        }
        Ok(outcome)
    }

    /// Resolves the sandbox status of one task and applies it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskSchedulerError::TaskNotFound`] for unknown tasks and
    /// repository errors when persistence fails.
    pub async fn refresh_status(
        &self,
        task_id: &TaskId,
    ) -> TaskSchedulerResult<SchedulerOutcome> {
        let task = self.load(task_id).await?;
        if !task.is_active() {
            return Ok(SchedulerOutcome::Unchanged(task));
        }
        let Some(sandbox_id) = task.sandbox_id().cloned() else {
            return Ok(SchedulerOutcome::Unchanged(task));
        };
        let observed = self.gateway.get_sandbox_status(&sandbox_id).await;
        self.apply_observation(task, observed.state(), observed.detail())
            .await
    }

    /// Polls every active task with a sandbox through one batched status
    /// call, scoped to a workspace when given.
    ///
    /// # Errors
    ///
    /// Returns repository errors when listing or writing tasks fails.
    pub async fn poll_active(
        &self,
        workspace_id: Option<&WorkspaceId>,
    ) -> TaskSchedulerResult<PollReport> {
        let active = match workspace_id {
            Some(workspace) => self.tasks.list_active_by_workspace(workspace).await?,
            None => self.tasks.list_active().await?,
        };
        let bound: Vec<(Task, SandboxId)> = active
            .into_iter()
            .filter_map(|task| {
                let sandbox_id = task.sandbox_id().cloned()?;
                Some((task, sandbox_id))
            })
            .collect();
        let mut report = PollReport {
            polled: bound.len(),
            ..PollReport::default()
        };
        if bound.is_empty() {
            return Ok(report);
        }

        let ids: Vec<SandboxId> = bound.iter().map(|(_, id)| id.clone()).collect();
        let batch = self.gateway.get_batch_sandbox_status(&ids).await;
        for (task, sandbox_id) in bound {
            let Some(observed) = batch.get(&sandbox_id) else {
                report.unresolved += 1;
                debug!(
                    task_id = %task.task_id(),
                    sandbox_id = %sandbox_id,
                    "sandbox status unresolved"
                );
                continue;
            };
            match self
                .apply_observation(task, observed.state(), observed.detail())
                .await?
            {
                SchedulerOutcome::Updated(_) => report.updated += 1,
                SchedulerOutcome::Superseded { .. } => report.superseded += 1,
                SchedulerOutcome::Unchanged(_) => {}
            }
        }
        Ok(report)
    }

    /// Proxies a request into the sandbox of a running task.
    ///
    /// Requests from one task reach its sandbox in submission order. A
    /// `SandboxNotFound` answer fails the task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskSchedulerError::TaskNotRunning`] unless the task is
    /// running and repository errors when failing the task cannot be
    /// persisted.
    pub async fn forward(
        &self,
        task_id: &TaskId,
        request: ProxyRequest,
    ) -> TaskSchedulerResult<GatewayResult> {
        let task = self.load(task_id).await?;
        let sandbox_id = task
            .sandbox_id()
            .cloned()
            .filter(|_| task.status() == TaskStatus::Running)
            .ok_or_else(|| TaskSchedulerError::TaskNotRunning {
                task_id: task_id.clone(),
                status: task.status(),
            })?;

        let result = self.gateway.proxy_sandbox_request(&sandbox_id, request).await;
        if result.error_code() == Some(GatewayErrorCode::SandboxNotFound) {
            let reason = result
                .error_message()
                .unwrap_or("sandbox not found")
                .to_owned();
            self.fail_task(task, &reason).await?;
        }
        Ok(result)
    }

    /// Applies an explicit completion signal to a running task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskSchedulerError::TaskNotRunning`] unless the task is
    /// running and repository errors when persistence fails.
    pub async fn complete(
        &self,
        task_id: &TaskId,
        signal: CompletionSignal,
    ) -> TaskSchedulerResult<SchedulerOutcome> {
        let mut task = self.load(task_id).await?;
        if task.status() != TaskStatus::Running {
            return Err(TaskSchedulerError::TaskNotRunning {
                task_id: task_id.clone(),
                status: task.status(),
            });
        }
        match signal {
            CompletionSignal::Succeeded => task.succeed(&*self.clock)?,
            CompletionSignal::Failed { reason } => task.fail(reason, &*self.clock)?,
        }
        self.commit(task, TaskStatus::Running).await
    }

    /// Starts one worker that assigns a sandbox and then waits until the
    /// task leaves the active set.
    ///
    /// Once a sandbox is bound the worker makes no gateway calls. Status
    /// reaches the task through [`Self::poll_active`], which batches every
    /// bound sandbox into one request.
    ///
    /// Returns `false` when a worker for the task is already running.
    #[must_use]
    pub fn spawn_worker(self: &Arc<Self>, task_id: TaskId) -> bool
    where
        G: 'static,
        R: 'static,
        C: 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry
            .workers
            .get(&task_id)
            .is_some_and(|worker| !worker.handle.is_finished())
        {
            return false;
        }
        let generation = registry.next_generation;
        registry.next_generation = generation.wrapping_add(1);
        let token = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let worker_token = token.clone();
        let worker_task = task_id.clone();
        let handle = tokio::spawn(async move {
            scheduler
                .run_worker(worker_task, worker_token, generation)
                .await;
        });
        registry.workers.insert(
            task_id,
            WorkerHandle {
                generation,
                token,
                handle,
            },
        );
        true
    }

    /// Cancels the worker of a task, dropping any in-flight gateway call.
    ///
    /// Returns `false` when no worker was running.
    #[must_use]
    pub fn cancel_worker(&self, task_id: &TaskId) -> bool {
        let removed = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .workers
            .remove(task_id);
        let Some(worker) = removed else {
            return false;
        };
        worker.token.cancel();
        debug!(task_id = %task_id, "worker cancelled");
        true
    }

    /// Returns the number of workers still running.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .workers
            .values()
            .filter(|worker| !worker.handle.is_finished())
            .count()
    }

    /// Cancels every worker and waits for them to stop.
    pub async fn shutdown(&self) {
        let drained: Vec<WorkerHandle> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .workers
            .drain()
            .map(|(_, worker)| worker)
            .collect();
        for worker in &drained {
            worker.token.cancel();
        }
        for worker in drained {
            if let Err(err) = worker.handle.await {
                warn!(error = %err, "task worker ended abnormally");
            }
        }
    }

    async fn run_worker(&self, task_id: TaskId, token: CancellationToken, generation: u64) {
        tokio::select! {
            () = token.cancelled() => {
                debug!(task_id = %task_id, "worker stopped by cancellation");
            }
            outcome = self.drive(&task_id) => {
                if let Err(err) = outcome {
                    warn!(task_id = %task_id, error = %err, "task worker failed");
                }
            }
        }
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry
            .workers
            .get(&task_id)
            .is_some_and(|worker| worker.generation == generation)
        {
            registry.workers.remove(&task_id);
        }
    }

    async fn drive(&self, task_id: &TaskId) -> TaskSchedulerResult<()> {
        loop {
            let Some(task) = self.tasks.get_by_task_id(task_id).await? else {
                return Ok(());
            };
            if !task.is_active() {
                return Ok(());
            }
            if task.sandbox_id().is_none() {
                let outcome = self.assign_sandbox(task_id).await?;
                if outcome.status().is_terminal() {
                    debug!(task_id = %task_id, status = %outcome.status(), "worker finished");
                    return Ok(());
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn load(&self, task_id: &TaskId) -> TaskSchedulerResult<Task> {
        self.tasks
            .get_by_task_id(task_id)
            .await?
            .ok_or_else(|| TaskSchedulerError::TaskNotFound(task_id.clone()))
    }

    fn sandbox_config(&self, task: &Task) -> TaskSchedulerResult<SandboxConfig> {
        let key = IdempotencyKey::new(task.task_id().as_str())
            .map_err(|_| TaskDomainError::EmptyIdentifier("task_id"))?;
        Ok(SandboxConfig::new()
            .with("image", self.config.sandbox_image.clone())
            .with("taskId", task.task_id().as_str())
            .with("workspaceId", task.workspace_id().as_str())
            .with("workDir", task.work_dir())
            .with("taskMode", task.task_mode().as_str())
            .with_idempotency_key(&key))
    }

    async fn handle_create_failure(
        &self,
        mut task: Task,
        result: &GatewayResult,
    ) -> TaskSchedulerResult<SchedulerOutcome> {
        let reason = result
            .error_message()
            .unwrap_or("sandbox creation returned no sandbox id")
            .to_owned();
        let retryable = result
            .error_code()
            .is_some_and(GatewayErrorCode::is_retryable);
        if retryable {
            warn!(
                task_id = %task.task_id(),
                reason = %reason,
                "sandbox creation will be retried"
            );
            task.retry_assignment(reason, &*self.clock)?;
        } else {
            warn!(task_id = %task.task_id(), reason = %reason, "sandbox creation failed");
            task.fail(reason, &*self.clock)?;
        }
        self.commit(task, TaskStatus::SandboxAssigning).await
    }

    async fn apply_observation(
        &self,
        mut task: Task,
        state: SandboxState,
        detail: Option<&str>,
    ) -> TaskSchedulerResult<SchedulerOutcome> {
        let from = task.status();
        match (from, state) {
            (TaskStatus::SandboxAssigning, SandboxState::Running) => {
                task.mark_running(&*self.clock)?;
                self.commit(task, from).await
            }
            (TaskStatus::SandboxAssigning | TaskStatus::Running, SandboxState::Stopped) => {
                let reason = detail.map_or_else(
                    || "sandbox stopped without a completion signal".to_owned(),
                    |text| format!("sandbox stopped without a completion signal: {text}"),
                );
                self.fail_task(task, &reason).await
            }
            (TaskStatus::SandboxAssigning | TaskStatus::Running, SandboxState::NotFound) => {
                self.fail_task(task, "sandbox no longer exists").await
            }
            _ => Ok(SchedulerOutcome::Unchanged(task)),
        }
    }

    async fn fail_task(
        &self,
        mut task: Task,
        reason: &str,
    ) -> TaskSchedulerResult<SchedulerOutcome> {
        let from = task.status();
        task.fail(reason, &*self.clock)?;
        self.commit(task, from).await
    }

    async fn commit(
        &self,
        task: Task,
        expected: TaskStatus,
    ) -> TaskSchedulerResult<SchedulerOutcome> {
        match self.tasks.update(&task, expected).await {
            Ok(()) => {
                if task.status() != expected {
                    debug!(
                        task_id = %task.task_id(),
                        from = %expected,
                        to = %task.status(),
                        "task status written"
                    );
                    self.events
                        .publish(&TaskEvent::StatusChanged {
                            task_id: task.task_id().clone(),
                            from: expected,
                            to: task.status(),
                            at: task.updated_at(),
                        })
                        .await;
                }
                Ok(SchedulerOutcome::Updated(task))
            }
            Err(TaskRepositoryError::StatusConflict {
                task_id, actual, ..
            }) => {
                info!(
                    task_id = %task_id,
                    expected = %expected,
                    actual = %actual,
                    "task changed concurrently; transition abandoned"
                );
                Ok(SchedulerOutcome::Superseded { task_id, actual })
            }
            Err(err) => Err(err.into()),
        }
    }
}
