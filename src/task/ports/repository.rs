//! Repository port for task persistence and compare-and-set status updates.

use crate::task::domain::{Task, TaskId, TaskStatus, WorkspaceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Task persistence contract.
///
/// Every status write is conditional on the status the caller last read, so
/// concurrent writers never silently overwrite each other.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the task id already
    /// exists, including soft-deleted rows.
    async fn create_task(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Finds a live task by external identifier.
    ///
    /// Soft-deleted tasks are reported as `None`.
    async fn get_by_task_id(&self, task_id: &TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Persists the whole task when its stored status still equals
    /// `expected_status`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when no live row exists and
    /// [`TaskRepositoryError::StatusConflict`] when the stored status differs.
    async fn update(&self, task: &Task, expected_status: TaskStatus) -> TaskRepositoryResult<()>;

    /// Moves a task from `expected` to `next` without touching other columns
    /// apart from `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when no live row exists and
    /// [`TaskRepositoryError::StatusConflict`] when the stored status differs.
    async fn update_status(
        &self,
        task_id: &TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        updated_at: DateTime<Utc>,
    ) -> TaskRepositoryResult<()>;

    /// Returns live, non-terminal tasks in one workspace ordered by creation.
    async fn list_active_by_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns live, non-terminal tasks across all workspaces ordered by
    /// creation.
    async fn list_active(&self) -> TaskRepositoryResult<Vec<Task>>;

    /// Tombstones a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when no live row exists.
    async fn soft_delete(
        &self,
        task_id: &TaskId,
        deleted_at: DateTime<Utc>,
    ) -> TaskRepositoryResult<()>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The stored status no longer matches the caller's expectation.
    #[error("task {task_id} status conflict: expected {expected}, found {actual}")]
    StatusConflict {
        /// Task being written.
        task_id: TaskId,
        /// Status the caller read.
        expected: TaskStatus,
        /// Status currently stored.
        actual: TaskStatus,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns `true` for compare-and-set failures.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::StatusConflict { .. })
    }
}
