//! `PostgreSQL` repository implementation for task storage.

use super::{
    TaskPgPool,
    models::{NewTaskRow, TaskChangeset, TaskRow},
    schema::tasks,
};
use crate::sandbox::domain::SandboxId;
use crate::task::{
    domain::{
        Attachment, DataIsolation, PersistedTaskData, Task, TaskId, TaskMode, TaskRecordId,
        TaskStatus, TopicId, WorkspaceId,
    },
    ports::{TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL`-backed task repository.
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: TaskPgPool,
}

impl PostgresTaskRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskRepositoryError::persistence)?
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn create_task(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.task_id().clone();
        let new_row = to_new_row(task)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(tasks::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskRepositoryError::DuplicateTask(task_id)
                    }
                    _ => TaskRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn get_by_task_id(&self, task_id: &TaskId) -> TaskRepositoryResult<Option<Task>> {
        let lookup = task_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::task_id.eq(lookup))
                .filter(tasks::deleted_at.is_null())
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn update(&self, task: &Task, expected_status: TaskStatus) -> TaskRepositoryResult<()> {
        let task_id = task.task_id().clone();
        let changeset = to_changeset(task)?;

        self.run_blocking(move |connection| {
            let updated = diesel::update(
                tasks::table
                    .filter(tasks::task_id.eq(task_id.as_str()))
                    .filter(tasks::task_status.eq(expected_status.code()))
                    .filter(tasks::deleted_at.is_null()),
            )
            .set(&changeset)
            .execute(connection)
            .map_err(TaskRepositoryError::persistence)?;
            if updated == 0 {
                return Err(explain_missed_update(connection, &task_id, expected_status));
            }
            Ok(())
        })
        .await
    }

    async fn update_status(
        &self,
        task_id: &TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        updated_at: DateTime<Utc>,
    ) -> TaskRepositoryResult<()> {
        let target = task_id.clone();
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                tasks::table
                    .filter(tasks::task_id.eq(target.as_str()))
                    .filter(tasks::task_status.eq(expected.code()))
                    .filter(tasks::deleted_at.is_null()),
            )
            .set((
                tasks::task_status.eq(next.code()),
                tasks::updated_at.eq(updated_at),
            ))
            .execute(connection)
            .map_err(TaskRepositoryError::persistence)?;
            if updated == 0 {
                return Err(explain_missed_update(connection, &target, expected));
            }
            Ok(())
        })
        .await
    }

    async fn list_active_by_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> TaskRepositoryResult<Vec<Task>> {
        let workspace = workspace_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::workspace_id.eq(workspace))
                .filter(tasks::deleted_at.is_null())
                .filter(tasks::task_status.eq_any(active_status_codes()))
                .order(tasks::created_at.asc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)
                .map_err(TaskRepositoryError::persistence)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn list_active(&self) -> TaskRepositoryResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::deleted_at.is_null())
                .filter(tasks::task_status.eq_any(active_status_codes()))
                .order(tasks::created_at.asc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)
                .map_err(TaskRepositoryError::persistence)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn soft_delete(
        &self,
        task_id: &TaskId,
        deleted_at: DateTime<Utc>,
    ) -> TaskRepositoryResult<()> {
        let target = task_id.clone();
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                tasks::table
                    .filter(tasks::task_id.eq(target.as_str()))
                    .filter(tasks::deleted_at.is_null()),
            )
            .set((
                tasks::deleted_at.eq(Some(deleted_at)),
                tasks::updated_at.eq(deleted_at),
            ))
            .execute(connection)
            .map_err(TaskRepositoryError::persistence)?;
            if updated == 0 {
                return Err(TaskRepositoryError::NotFound(target));
            }
            Ok(())
        })
        .await
    }
}

/// Status codes of tasks that still need polling.
pub(super) fn active_status_codes() -> Vec<i16> {
    TaskStatus::ALL
        .into_iter()
        .filter(|status| !status.is_terminal())
        .map(TaskStatus::code)
        .collect()
}

/// Distinguishes a missing row from a status conflict after a conditional
/// update touched nothing.
fn explain_missed_update(
    connection: &mut PgConnection,
    task_id: &TaskId,
    expected: TaskStatus,
) -> TaskRepositoryError {
    let stored = tasks::table
        .filter(tasks::task_id.eq(task_id.as_str()))
        .filter(tasks::deleted_at.is_null())
        .select(tasks::task_status)
        .first::<i16>(connection)
        .optional();
    match stored {
        Err(err) => TaskRepositoryError::persistence(err),
        Ok(None) => TaskRepositoryError::NotFound(task_id.clone()),
        Ok(Some(code)) => match TaskStatus::try_from(code) {
            Ok(actual) => TaskRepositoryError::StatusConflict {
                task_id: task_id.clone(),
                expected,
                actual,
            },
            Err(err) => TaskRepositoryError::persistence(err),
        },
    }
}

pub(super) fn to_new_row(task: &Task) -> TaskRepositoryResult<NewTaskRow> {
    let attachments =
        serde_json::to_value(task.attachments()).map_err(TaskRepositoryError::persistence)?;

    Ok(NewTaskRow {
        id: task.id().into_inner(),
        task_id: task.task_id().as_str().to_owned(),
        organization_code: task.isolation().organization_code().as_str().to_owned(),
        user_id: task.isolation().user_id().as_str().to_owned(),
        workspace_id: task.workspace_id().as_str().to_owned(),
        topic_id: task.topic_id().as_str().to_owned(),
        sandbox_id: task.sandbox_id().map(|id| id.as_str().to_owned()),
        prompt: task.prompt().to_owned(),
        attachments,
        task_status: task.status().code(),
        work_dir: task.work_dir().to_owned(),
        task_mode: task.task_mode().as_str().to_owned(),
        error_message: task.error_message().map(str::to_owned),
        created_at: task.created_at(),
        updated_at: task.updated_at(),
        deleted_at: task.deleted_at(),
    })
}

pub(super) fn to_changeset(task: &Task) -> TaskRepositoryResult<TaskChangeset> {
    let attachments =
        serde_json::to_value(task.attachments()).map_err(TaskRepositoryError::persistence)?;

    Ok(TaskChangeset {
        sandbox_id: task.sandbox_id().map(|id| id.as_str().to_owned()),
        prompt: task.prompt().to_owned(),
        attachments,
        task_status: task.status().code(),
        work_dir: task.work_dir().to_owned(),
        task_mode: task.task_mode().as_str().to_owned(),
        error_message: task.error_message().map(str::to_owned),
        updated_at: task.updated_at(),
        deleted_at: task.deleted_at(),
    })
}

pub(super) fn row_to_task(row: TaskRow) -> TaskRepositoryResult<Task> {
    let attachments = serde_json::from_value::<Vec<Attachment>>(row.attachments)
        .map_err(TaskRepositoryError::persistence)?;
    let status = TaskStatus::try_from(row.task_status).map_err(TaskRepositoryError::persistence)?;
    let task_mode =
        TaskMode::try_from(row.task_mode.as_str()).map_err(TaskRepositoryError::persistence)?;
    let isolation = DataIsolation::from_parts(&row.organization_code, &row.user_id)
        .map_err(TaskRepositoryError::persistence)?;

    let data = PersistedTaskData {
        id: TaskRecordId::from_uuid(row.id),
        task_id: TaskId::new(row.task_id).map_err(TaskRepositoryError::persistence)?,
        isolation,
        workspace_id: WorkspaceId::new(row.workspace_id)
            .map_err(TaskRepositoryError::persistence)?,
        topic_id: TopicId::new(row.topic_id).map_err(TaskRepositoryError::persistence)?,
        sandbox_id: row.sandbox_id.map(SandboxId::new),
        prompt: row.prompt,
        attachments,
        status,
        work_dir: row.work_dir,
        task_mode,
        error_message: row.error_message,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
    };
    Ok(Task::from_persisted(data))
}
