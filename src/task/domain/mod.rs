//! Domain model for tasks that run inside sandboxes.
//!
//! A task binds a user prompt to at most one sandbox for its lifetime and
//! tracks its progress through a small status machine. Files produced or
//! consumed by the task are recorded alongside it. Infrastructure concerns
//! stay outside this boundary.

mod error;
mod event;
mod file;
mod ids;
mod status;
mod task;

pub use error::{ParseTaskFieldError, ParseTaskStatusError, TaskDomainError};
pub use event::TaskEvent;
pub use file::{FileType, NewTaskFile, PersistedTaskFileData, StorageType, TaskFile};
pub use ids::{
    DataIsolation, FileId, OrganizationCode, TaskId, TaskRecordId, TopicId, UserId, WorkspaceId,
};
pub use status::TaskStatus;
pub use task::{Attachment, NewTask, PersistedTaskData, Task, TaskMode};
