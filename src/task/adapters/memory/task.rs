//! In-memory task repository for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{PersistedTaskData, Task, TaskId, TaskStatus, WorkspaceId},
    ports::{TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task repository.
///
/// Compare-and-set writes behave exactly as the `PostgreSQL` adapter's
/// conditional updates do.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: &impl ToString) -> TaskRepositoryError {
    TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

/// Returns the live task or the appropriate repository error.
fn live_task<'a>(
    tasks: &'a mut HashMap<TaskId, Task>,
    task_id: &TaskId,
    expected: TaskStatus,
) -> TaskRepositoryResult<&'a mut Task> {
    let stored = tasks
        .get_mut(task_id)
        .filter(|task| !task.is_deleted())
        .ok_or_else(|| TaskRepositoryError::NotFound(task_id.clone()))?;
    if stored.status() != expected {
        return Err(TaskRepositoryError::StatusConflict {
            task_id: task_id.clone(),
            expected,
            actual: stored.status(),
        });
    }
    Ok(stored)
}

fn active_sorted<'a>(tasks: impl Iterator<Item = &'a Task>) -> Vec<Task> {
    let mut active: Vec<Task> = tasks.filter(|task| task.is_active()).cloned().collect();
    active.sort_by_key(Task::created_at);
    active
}

fn snapshot(task: &Task) -> PersistedTaskData {
    PersistedTaskData {
        id: task.id(),
        task_id: task.task_id().clone(),
        isolation: task.isolation().clone(),
        workspace_id: task.workspace_id().clone(),
        topic_id: task.topic_id().clone(),
        sandbox_id: task.sandbox_id().cloned(),
        prompt: task.prompt().to_owned(),
        attachments: task.attachments().to_vec(),
        status: task.status(),
        work_dir: task.work_dir().to_owned(),
        task_mode: task.task_mode(),
        error_message: task.error_message().map(str::to_owned),
        created_at: task.created_at(),
        updated_at: task.updated_at(),
        deleted_at: task.deleted_at(),
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut tasks = self.state.write().map_err(|err| lock_error(&err))?;
        if tasks.contains_key(task.task_id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.task_id().clone()));
        }
        tasks.insert(task.task_id().clone(), task.clone());
        Ok(())
    }

    async fn get_by_task_id(&self, task_id: &TaskId) -> TaskRepositoryResult<Option<Task>> {
        let tasks = self.state.read().map_err(|err| lock_error(&err))?;
        Ok(tasks.get(task_id).filter(|task| !task.is_deleted()).cloned())
    }

    async fn update(&self, task: &Task, expected_status: TaskStatus) -> TaskRepositoryResult<()> {
        let mut tasks = self.state.write().map_err(|err| lock_error(&err))?;
        let stored = live_task(&mut tasks, task.task_id(), expected_status)?;
        *stored = task.clone();
        Ok(())
    }

    async fn update_status(
        &self,
        task_id: &TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        updated_at: DateTime<Utc>,
    ) -> TaskRepositoryResult<()> {
        let mut tasks = self.state.write().map_err(|err| lock_error(&err))?;
        let stored = live_task(&mut tasks, task_id, expected)?;
        *stored = Task::from_persisted(PersistedTaskData {
            status: next,
            updated_at,
            ..snapshot(stored)
        });
        Ok(())
    }

    async fn list_active_by_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> TaskRepositoryResult<Vec<Task>> {
        let tasks = self.state.read().map_err(|err| lock_error(&err))?;
        Ok(active_sorted(
            tasks
                .values()
                .filter(|task| task.workspace_id() == workspace_id),
        ))
    }

    async fn list_active(&self) -> TaskRepositoryResult<Vec<Task>> {
        let tasks = self.state.read().map_err(|err| lock_error(&err))?;
        Ok(active_sorted(tasks.values()))
    }

    async fn soft_delete(
        &self,
        task_id: &TaskId,
        deleted_at: DateTime<Utc>,
    ) -> TaskRepositoryResult<()> {
        let mut tasks = self.state.write().map_err(|err| lock_error(&err))?;
        let stored = tasks
            .get_mut(task_id)
            .filter(|task| !task.is_deleted())
            .ok_or_else(|| TaskRepositoryError::NotFound(task_id.clone()))?;
        *stored = Task::from_persisted(PersistedTaskData {
            updated_at: deleted_at,
            deleted_at: Some(deleted_at),
            ..snapshot(stored)
        });
        Ok(())
    }
}
