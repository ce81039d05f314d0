//! Error types for task domain validation and parsing.

use super::{TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating task domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// A required identifier is empty after trimming.
    #[error("{0} must not be empty")]
    EmptyIdentifier(&'static str),

    /// The task prompt is empty after trimming.
    #[error("task prompt must not be empty")]
    EmptyPrompt,

    /// The requested status change is not part of the lifecycle.
    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task being changed.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// A sandbox is already bound to the task.
    #[error("task {0} already has a sandbox assigned")]
    SandboxAlreadyAssigned(TaskId),

    /// The task has no sandbox but the operation requires one.
    #[error("task {0} has no sandbox assigned")]
    SandboxNotAssigned(TaskId),

    /// The task has been soft-deleted.
    #[error("task {0} has been deleted")]
    TaskDeleted(TaskId),

    /// The file key is not a relative storage path.
    #[error("invalid file key '{0}', expected a relative path without '..' segments")]
    InvalidFileKey(String),

    /// The file size does not fit the persisted representation.
    #[error("file size {0} exceeds the supported maximum")]
    FileTooLarge(u64),
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("unknown task status code: {0}")]
pub struct ParseTaskStatusError(pub i16);

/// Error returned while parsing textual task fields from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {field}: {value}")]
pub struct ParseTaskFieldError {
    /// Name of the field being parsed.
    pub field: &'static str,
    /// Rejected value.
    pub value: String,
}

impl ParseTaskFieldError {
    /// Creates a parse error for `field`.
    #[must_use]
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}
