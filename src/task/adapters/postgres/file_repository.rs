//! `PostgreSQL` repository implementation for task file storage.

use super::{
    TaskPgPool,
    models::{NewTaskFileRow, StorageBackfill, TaskFileRow},
    schema::task_files,
};
use crate::task::{
    domain::{
        DataIsolation, FileId, FileType, PersistedTaskFileData, StorageType, TaskFile, TaskId,
        TopicId,
    },
    ports::{TaskFileRepository, TaskFileRepositoryError, TaskFileRepositoryResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL`-backed task file repository.
#[derive(Debug, Clone)]
pub struct PostgresTaskFileRepository {
    pool: TaskPgPool,
}

impl PostgresTaskFileRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskFileRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskFileRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskFileRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskFileRepositoryError::persistence)?
    }
}

#[async_trait]
impl TaskFileRepository for PostgresTaskFileRepository {
    async fn create_file(&self, file: &TaskFile) -> TaskFileRepositoryResult<()> {
        let file_id = file.file_id();
        let new_row = to_new_file_row(file)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(task_files::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskFileRepositoryError::DuplicateFile(file_id)
                    }
                    _ => TaskFileRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn list_by_task_id(&self, task_id: &TaskId) -> TaskFileRepositoryResult<Vec<TaskFile>> {
        let lookup = task_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let rows = task_files::table
                .filter(task_files::task_id.eq(lookup))
                .filter(task_files::deleted_at.is_null())
                .order(task_files::created_at.asc())
                .select(TaskFileRow::as_select())
                .load::<TaskFileRow>(connection)
                .map_err(TaskFileRepositoryError::persistence)?;
            rows.into_iter().map(row_to_file).collect()
        })
        .await
    }

    async fn soft_delete_by_task_id(
        &self,
        task_id: &TaskId,
        deleted_at: DateTime<Utc>,
    ) -> TaskFileRepositoryResult<usize> {
        let target = task_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            diesel::update(
                task_files::table
                    .filter(task_files::task_id.eq(target))
                    .filter(task_files::deleted_at.is_null()),
            )
            .set((
                task_files::deleted_at.eq(Some(deleted_at)),
                task_files::updated_at.eq(deleted_at),
            ))
            .execute(connection)
            .map_err(TaskFileRepositoryError::persistence)
        })
        .await
    }

    async fn backfill_storage(&self, file: &TaskFile) -> TaskFileRepositoryResult<()> {
        let file_id = file.file_id();
        let changeset = StorageBackfill {
            storage_type: file.storage_type().as_str().to_owned(),
            external_url: file.external_url().map(str::to_owned),
            updated_at: file.updated_at(),
        };
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                task_files::table
                    .filter(task_files::file_id.eq(file_id.into_inner()))
                    .filter(task_files::deleted_at.is_null()),
            )
            .set(&changeset)
            .execute(connection)
            .map_err(TaskFileRepositoryError::persistence)?;
            if updated == 0 {
                return Err(TaskFileRepositoryError::NotFound(file_id));
            }
            Ok(())
        })
        .await
    }
}

pub(super) fn to_new_file_row(file: &TaskFile) -> TaskFileRepositoryResult<NewTaskFileRow> {
    let file_size = i64::try_from(file.file_size()).map_err(TaskFileRepositoryError::persistence)?;

    Ok(NewTaskFileRow {
        file_id: file.file_id().into_inner(),
        organization_code: file.isolation().organization_code().as_str().to_owned(),
        user_id: file.isolation().user_id().as_str().to_owned(),
        topic_id: file.topic_id().as_str().to_owned(),
        task_id: file.task_id().as_str().to_owned(),
        file_type: file.file_type().as_str().to_owned(),
        file_name: file.file_name().to_owned(),
        file_extension: file.file_extension().to_owned(),
        file_key: file.file_key().to_owned(),
        file_size,
        external_url: file.external_url().map(str::to_owned),
        menu: file.menu().map(str::to_owned),
        storage_type: file.storage_type().as_str().to_owned(),
        created_at: file.created_at(),
        updated_at: file.updated_at(),
        deleted_at: file.deleted_at(),
    })
}

pub(super) fn row_to_file(row: TaskFileRow) -> TaskFileRepositoryResult<TaskFile> {
    let file_size = u64::try_from(row.file_size).map_err(TaskFileRepositoryError::persistence)?;
    let file_type =
        FileType::try_from(row.file_type.as_str()).map_err(TaskFileRepositoryError::persistence)?;
    let storage_type = StorageType::from_persisted(Some(row.storage_type.as_str()))
        .map_err(TaskFileRepositoryError::persistence)?;
    let isolation = DataIsolation::from_parts(&row.organization_code, &row.user_id)
        .map_err(TaskFileRepositoryError::persistence)?;

    Ok(TaskFile::from_persisted(PersistedTaskFileData {
        file_id: FileId::from_uuid(row.file_id),
        isolation,
        topic_id: TopicId::new(row.topic_id).map_err(TaskFileRepositoryError::persistence)?,
        task_id: TaskId::new(row.task_id).map_err(TaskFileRepositoryError::persistence)?,
        file_type,
        file_name: row.file_name,
        file_extension: row.file_extension,
        file_key: row.file_key,
        file_size,
        external_url: row.external_url,
        menu: row.menu,
        storage_type,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
    }))
}
