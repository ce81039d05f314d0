//! In-memory task file repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{FileId, PersistedTaskFileData, TaskFile, TaskId},
    ports::{TaskFileRepository, TaskFileRepositoryError, TaskFileRepositoryResult},
};

/// Thread-safe in-memory task file repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskFileRepository {
    state: Arc<RwLock<HashMap<FileId, TaskFile>>>,
}

impl InMemoryTaskFileRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: &impl ToString) -> TaskFileRepositoryError {
    TaskFileRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

fn snapshot(file: &TaskFile) -> PersistedTaskFileData {
    PersistedTaskFileData {
        file_id: file.file_id(),
        isolation: file.isolation().clone(),
        topic_id: file.topic_id().clone(),
        task_id: file.task_id().clone(),
        file_type: file.file_type(),
        file_name: file.file_name().to_owned(),
        file_extension: file.file_extension().to_owned(),
        file_key: file.file_key().to_owned(),
        file_size: file.file_size(),
        external_url: file.external_url().map(str::to_owned),
        menu: file.menu().map(str::to_owned),
        storage_type: file.storage_type(),
        created_at: file.created_at(),
        updated_at: file.updated_at(),
        deleted_at: file.deleted_at(),
    }
}

#[async_trait]
impl TaskFileRepository for InMemoryTaskFileRepository {
    async fn create_file(&self, file: &TaskFile) -> TaskFileRepositoryResult<()> {
        let mut files = self.state.write().map_err(|err| lock_error(&err))?;
        if files.contains_key(&file.file_id()) {
            return Err(TaskFileRepositoryError::DuplicateFile(file.file_id()));
        }
        files.insert(file.file_id(), file.clone());
        Ok(())
    }

    async fn list_by_task_id(&self, task_id: &TaskId) -> TaskFileRepositoryResult<Vec<TaskFile>> {
        let files = self.state.read().map_err(|err| lock_error(&err))?;
        let mut matching: Vec<TaskFile> = files
            .values()
            .filter(|file| file.task_id() == task_id && !file.is_deleted())
            .cloned()
            .collect();
        matching.sort_by_key(TaskFile::created_at);
        Ok(matching)
    }

    async fn soft_delete_by_task_id(
        &self,
        task_id: &TaskId,
        deleted_at: DateTime<Utc>,
    ) -> TaskFileRepositoryResult<usize> {
        let mut files = self.state.write().map_err(|err| lock_error(&err))?;
        let mut deleted = 0;
        for stored in files
            .values_mut()
            .filter(|file| file.task_id() == task_id && !file.is_deleted())
        {
            *stored = TaskFile::from_persisted(PersistedTaskFileData {
                updated_at: deleted_at,
                deleted_at: Some(deleted_at),
                ..snapshot(stored)
            });
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn backfill_storage(&self, file: &TaskFile) -> TaskFileRepositoryResult<()> {
        let mut files = self.state.write().map_err(|err| lock_error(&err))?;
        let stored = files
            .get_mut(&file.file_id())
            .filter(|existing| !existing.is_deleted())
            .ok_or(TaskFileRepositoryError::NotFound(file.file_id()))?;
        *stored = TaskFile::from_persisted(PersistedTaskFileData {
            storage_type: file.storage_type(),
            external_url: file.external_url().map(str::to_owned),
            updated_at: file.updated_at(),
            ..snapshot(stored)
        });
        Ok(())
    }
}
