//! Service layer for task submission, cancellation, files, and deletion.

use super::TaskEventBus;
use crate::task::{
    domain::{
        FileId, NewTask, NewTaskFile, StorageType, Task, TaskDomainError, TaskEvent, TaskFile,
        TaskId,
    },
    ports::{TaskFileRepository, TaskFileRepositoryError, TaskRepository, TaskRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Service-level errors for task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Task repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
    /// File repository operation failed.
    #[error(transparent)]
    FileRepository(#[from] TaskFileRepositoryError),
    /// No live task has the identifier.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// No live file of the task has the identifier.
    #[error("file {file_id} not found for task {task_id}")]
    FileNotFound {
        /// Owning task.
        task_id: TaskId,
        /// Requested file.
        file_id: FileId,
    },
}

/// Result type for task lifecycle service operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

/// Task lifecycle orchestration service.
#[derive(Clone)]
pub struct TaskLifecycleService<R, F, C>
where
    R: TaskRepository,
    F: TaskFileRepository,
    C: Clock + Send + Sync,
{
    tasks: Arc<R>,
    files: Arc<F>,
    events: Arc<TaskEventBus>,
    clock: Arc<C>,
    conflict_retries: u32,
}

impl<R, F, C> TaskLifecycleService<R, F, C>
where
    R: TaskRepository,
    F: TaskFileRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new task lifecycle service.
    #[must_use]
    pub const fn new(
        tasks: Arc<R>,
        files: Arc<F>,
        events: Arc<TaskEventBus>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            tasks,
            files,
            events,
            clock,
            conflict_retries: 3,
        }
    }

    /// Sets how many times a conflicting status write is re-read and retried.
    #[must_use]
    pub const fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Submits a new pending task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Domain`] for invalid input and
    /// [`TaskLifecycleError::Repository`] when the task id is taken or
    /// persistence fails.
    pub async fn create_task(&self, request: NewTask) -> TaskLifecycleResult<Task> {
        let task = Task::new(request, &*self.clock)?;
        self.tasks.create_task(&task).await?;
        info!(task_id = %task.task_id(), workspace_id = %task.workspace_id(), "task created");
        self.events
            .publish(&TaskEvent::Created {
                task_id: task.task_id().clone(),
                at: task.created_at(),
            })
            .await;
        Ok(task)
    }

    /// Retrieves a live task.
    ///
    /// Returns `Ok(None)` for unknown or deleted tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when lookup fails.
    pub async fn find_task(&self, task_id: &TaskId) -> TaskLifecycleResult<Option<Task>> {
        Ok(self.tasks.get_by_task_id(task_id).await?)
    }

    /// Cancels a task, re-reading and retrying when a concurrent writer
    /// changes its status first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::TaskNotFound`] for unknown tasks,
    /// [`TaskLifecycleError::Domain`] when the task is already terminal, and
    /// [`TaskLifecycleError::Repository`] when conflicts persist past the
    /// retry budget.
    pub async fn cancel_task(&self, task_id: &TaskId) -> TaskLifecycleResult<Task> {
        let mut attempt = 0;
        loop {
            let mut task = self.load(task_id).await?;
            let from = task.status();
            task.cancel(&*self.clock)?;

            match self.tasks.update(&task, from).await {
                Ok(()) => {
                    info!(task_id = %task_id, from = %from, "task cancelled");
                    self.events
                        .publish(&TaskEvent::StatusChanged {
                            task_id: task_id.clone(),
                            from,
                            to: task.status(),
                            at: task.updated_at(),
                        })
                        .await;
                    return Ok(task);
                }
                Err(err) if err.is_conflict() && attempt < self.conflict_retries => {
                    debug!(
                        task_id = %task_id,
                        attempt,
                        error = %err,
                        "retrying cancel after conflict"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Records a file against a live task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::TaskNotFound`] when the task is missing
    /// or deleted, [`TaskLifecycleError::Domain`] for invalid file data, and
    /// [`TaskLifecycleError::FileRepository`] when persistence fails.
    pub async fn record_file(&self, request: NewTaskFile) -> TaskLifecycleResult<TaskFile> {
        let task_id = request.task_id.clone();
        self.load(&task_id).await?;
        let file = TaskFile::new(request, &*self.clock)?;
        self.files.create_file(&file).await?;
        debug!(
            task_id = %task_id,
            file_id = %file.file_id(),
            file_key = file.file_key(),
            "task file recorded"
        );
        self.events
            .publish(&TaskEvent::FileRecorded {
                task_id,
                file_id: file.file_id(),
                at: file.created_at(),
            })
            .await;
        Ok(file)
    }

    /// Lists the live files of a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::FileRepository`] when lookup fails.
    pub async fn list_files(&self, task_id: &TaskId) -> TaskLifecycleResult<Vec<TaskFile>> {
        Ok(self.files.list_by_task_id(task_id).await?)
    }

    /// Records where the bytes of an existing file now live.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::FileNotFound`] when the task has no such
    /// live file and [`TaskLifecycleError::FileRepository`] when persistence
    /// fails.
    pub async fn backfill_file_storage(
        &self,
        task_id: &TaskId,
        file_id: FileId,
        storage_type: StorageType,
        external_url: Option<String>,
    ) -> TaskLifecycleResult<TaskFile> {
        let mut file = self
            .files
            .list_by_task_id(task_id)
            .await?
            .into_iter()
            .find(|candidate| candidate.file_id() == file_id)
            .ok_or_else(|| TaskLifecycleError::FileNotFound {
                task_id: task_id.clone(),
                file_id,
            })?;
        file.backfill_storage(storage_type, external_url, &*self.clock);
        self.files.backfill_storage(&file).await?;
        Ok(file)
    }

    /// Soft-deletes a task and then its files.
    ///
    /// Returns the number of files tombstoned.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::TaskNotFound`] for unknown or already
    /// deleted tasks and repository errors when persistence fails.
    pub async fn delete_task(&self, task_id: &TaskId) -> TaskLifecycleResult<usize> {
        let now = self.clock.utc();
        self.tasks
            .soft_delete(task_id, now)
            .await
            .map_err(|err| match err {
                TaskRepositoryError::NotFound(missing) => TaskLifecycleError::TaskNotFound(missing),
                other => TaskLifecycleError::Repository(other),
            })?;
        let files_deleted = self.files.soft_delete_by_task_id(task_id, now).await?;
        info!(task_id = %task_id, files_deleted, "task deleted");
        self.events
            .publish(&TaskEvent::Deleted {
                task_id: task_id.clone(),
                files_deleted,
                at: now,
            })
            .await;
        Ok(files_deleted)
    }

    async fn load(&self, task_id: &TaskId) -> TaskLifecycleResult<Task> {
        self.tasks
            .get_by_task_id(task_id)
            .await?
            .ok_or_else(|| TaskLifecycleError::TaskNotFound(task_id.clone()))
    }
}
