//! Diesel row models for task and task file persistence.

use super::schema::{task_files, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Surrogate row identifier.
    pub id: uuid::Uuid,
    /// External task identifier.
    pub task_id: String,
    /// Owning organization.
    pub organization_code: String,
    /// Owning user.
    pub user_id: String,
    /// Workspace identifier.
    pub workspace_id: String,
    /// Topic identifier.
    pub topic_id: String,
    /// Assigned sandbox.
    pub sandbox_id: Option<String>,
    /// Prompt text.
    pub prompt: String,
    /// Attachments JSON array.
    pub attachments: Value,
    /// Lifecycle status code.
    pub task_status: i16,
    /// Working directory.
    pub work_dir: String,
    /// Execution mode.
    pub task_mode: String,
    /// Last failure reason.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert model for task records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    /// Surrogate row identifier.
    pub id: uuid::Uuid,
    /// External task identifier.
    pub task_id: String,
    /// Owning organization.
    pub organization_code: String,
    /// Owning user.
    pub user_id: String,
    /// Workspace identifier.
    pub workspace_id: String,
    /// Topic identifier.
    pub topic_id: String,
    /// Assigned sandbox.
    pub sandbox_id: Option<String>,
    /// Prompt text.
    pub prompt: String,
    /// Attachments JSON array.
    pub attachments: Value,
    /// Lifecycle status code.
    pub task_status: i16,
    /// Working directory.
    pub work_dir: String,
    /// Execution mode.
    pub task_mode: String,
    /// Last failure reason.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Full-row changeset applied by compare-and-set updates.
///
/// `None` clears the column.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = tasks, treat_none_as_null = true)]
pub struct TaskChangeset {
    /// Assigned sandbox.
    pub sandbox_id: Option<String>,
    /// Prompt text.
    pub prompt: String,
    /// Attachments JSON array.
    pub attachments: Value,
    /// Lifecycle status code.
    pub task_status: i16,
    /// Working directory.
    pub work_dir: String,
    /// Execution mode.
    pub task_mode: String,
    /// Last failure reason.
    pub error_message: Option<String>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Query result row for task file records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskFileRow {
    /// File identifier.
    pub file_id: uuid::Uuid,
    /// Owning organization.
    pub organization_code: String,
    /// Owning user.
    pub user_id: String,
    /// Topic identifier.
    pub topic_id: String,
    /// Owning task identifier.
    pub task_id: String,
    /// Origin of the file.
    pub file_type: String,
    /// Display name.
    pub file_name: String,
    /// Extension without the dot.
    pub file_extension: String,
    /// Storage-relative path.
    pub file_key: String,
    /// Size in bytes.
    pub file_size: i64,
    /// Publicly reachable URL.
    pub external_url: Option<String>,
    /// Display grouping.
    pub menu: Option<String>,
    /// Store holding the bytes.
    pub storage_type: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert model for task file records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_files)]
pub struct NewTaskFileRow {
    /// File identifier.
    pub file_id: uuid::Uuid,
    /// Owning organization.
    pub organization_code: String,
    /// Owning user.
    pub user_id: String,
    /// Topic identifier.
    pub topic_id: String,
    /// Owning task identifier.
    pub task_id: String,
    /// Origin of the file.
    pub file_type: String,
    /// Display name.
    pub file_name: String,
    /// Extension without the dot.
    pub file_extension: String,
    /// Storage-relative path.
    pub file_key: String,
    /// Size in bytes.
    pub file_size: i64,
    /// Publicly reachable URL.
    pub external_url: Option<String>,
    /// Display grouping.
    pub menu: Option<String>,
    /// Store holding the bytes.
    pub storage_type: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Storage-location changeset written by backfills.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = task_files, treat_none_as_null = true)]
pub struct StorageBackfill {
    /// Store holding the bytes.
    pub storage_type: String,
    /// Publicly reachable URL.
    pub external_url: Option<String>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
