//! Repository port for task file records.

use crate::task::domain::{FileId, TaskFile, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for task file repository operations.
pub type TaskFileRepositoryResult<T> = Result<T, TaskFileRepositoryError>;

/// Task file persistence contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskFileRepository: Send + Sync {
    /// Stores a new file record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskFileRepositoryError::DuplicateFile`] when the file id
    /// already exists.
    async fn create_file(&self, file: &TaskFile) -> TaskFileRepositoryResult<()>;

    /// Returns live files for a task ordered by creation.
    async fn list_by_task_id(&self, task_id: &TaskId) -> TaskFileRepositoryResult<Vec<TaskFile>>;

    /// Tombstones every live file of a task and returns how many changed.
    async fn soft_delete_by_task_id(
        &self,
        task_id: &TaskId,
        deleted_at: DateTime<Utc>,
    ) -> TaskFileRepositoryResult<usize>;

    /// Persists the storage location of an existing file.
    ///
    /// Only `storage_type`, `external_url`, and `updated_at` are written.
    ///
    /// # Errors
    ///
    /// Returns [`TaskFileRepositoryError::NotFound`] when no live row exists.
    async fn backfill_storage(&self, file: &TaskFile) -> TaskFileRepositoryResult<()>;
}

/// Errors returned by task file repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskFileRepositoryError {
    /// A file with the same identifier already exists.
    #[error("duplicate file identifier: {0}")]
    DuplicateFile(FileId),

    /// The file was not found.
    #[error("file not found: {0}")]
    NotFound(FileId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskFileRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
