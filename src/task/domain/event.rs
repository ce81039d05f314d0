//! Lifecycle events published when tasks change.

use super::{FileId, TaskId, TaskStatus};
use crate::sandbox::domain::SandboxId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification emitted after a task change has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task was submitted.
    Created {
        /// Task identifier.
        task_id: TaskId,
        /// When the change was persisted.
        at: DateTime<Utc>,
    },
    /// A task moved between statuses.
    StatusChanged {
        /// Task identifier.
        task_id: TaskId,
        /// Previous status.
        from: TaskStatus,
        /// New status.
        to: TaskStatus,
        /// When the change was persisted.
        at: DateTime<Utc>,
    },
    /// A sandbox was bound to a task.
    SandboxAssigned {
        /// Task identifier.
        task_id: TaskId,
        /// Bound sandbox.
        sandbox_id: SandboxId,
        /// When the change was persisted.
        at: DateTime<Utc>,
    },
    /// A file was recorded against a task.
    FileRecorded {
        /// Task identifier.
        task_id: TaskId,
        /// Recorded file.
        file_id: FileId,
        /// When the change was persisted.
        at: DateTime<Utc>,
    },
    /// A task and its files were soft-deleted.
    Deleted {
        /// Task identifier.
        task_id: TaskId,
        /// Number of files tombstoned alongside the task.
        files_deleted: usize,
        /// When the change was persisted.
        at: DateTime<Utc>,
    },
}

impl TaskEvent {
    /// Returns the task the event concerns.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Created { task_id, .. }
            | Self::StatusChanged { task_id, .. }
            | Self::SandboxAssigned { task_id, .. }
            | Self::FileRecorded { task_id, .. }
            | Self::Deleted { task_id, .. } => task_id,
        }
    }

    /// Returns when the change was persisted.
    #[must_use]
    pub const fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Created { at, .. }
            | Self::StatusChanged { at, .. }
            | Self::SandboxAssigned { at, .. }
            | Self::FileRecorded { at, .. }
            | Self::Deleted { at, .. } => *at,
        }
    }

    /// Returns a stable label for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::StatusChanged { .. } => "status_changed",
            Self::SandboxAssigned { .. } => "sandbox_assigned",
            Self::FileRecorded { .. } => "file_recorded",
            Self::Deleted { .. } => "deleted",
        }
    }
}
