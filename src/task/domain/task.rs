//! Task aggregate root and related value types.

use super::{
    DataIsolation, ParseTaskFieldError, TaskDomainError, TaskId, TaskRecordId, TaskStatus,
    TopicId, WorkspaceId,
};
use crate::sandbox::domain::SandboxId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the agent inside the sandbox approaches the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Conversational turn-by-turn execution.
    #[default]
    Chat,
    /// Plan first, then execute.
    Plan,
}

impl TaskMode {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Plan => "plan",
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskMode {
    type Error = ParseTaskFieldError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "plan" => Ok(Self::Plan),
            _ => Err(ParseTaskFieldError::new("task mode", value)),
        }
    }
}

/// Input file attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Storage-relative key of the uploaded file.
    pub file_key: String,
    /// Display name.
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
}

impl Attachment {
    /// Creates an attachment.
    #[must_use]
    pub fn new(file_key: impl Into<String>, file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_key: file_key.into(),
            file_name: file_name.into(),
            file_size,
        }
    }
}

/// Parameters for submitting a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// External task identifier.
    pub task_id: TaskId,
    /// Owning organization and user.
    pub isolation: DataIsolation,
    /// Workspace the task runs against.
    pub workspace_id: WorkspaceId,
    /// Conversation topic.
    pub topic_id: TopicId,
    /// Prompt handed to the agent.
    pub prompt: String,
    /// Attached input files.
    pub attachments: Vec<Attachment>,
    /// Working directory inside the sandbox.
    pub work_dir: String,
    /// Execution mode.
    pub task_mode: TaskMode,
}

/// Task aggregate root.
///
/// Owns the status machine and the binding to a sandbox. Once a sandbox id is
/// recorded it never changes, including after the task becomes terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskRecordId,
    task_id: TaskId,
    isolation: DataIsolation,
    workspace_id: WorkspaceId,
    topic_id: TopicId,
    sandbox_id: Option<SandboxId>,
    prompt: String,
    attachments: Vec<Attachment>,
    status: TaskStatus,
    work_dir: String,
    task_mode: TaskMode,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Surrogate row identifier.
    pub id: TaskRecordId,
    /// External task identifier.
    pub task_id: TaskId,
    /// Owning organization and user.
    pub isolation: DataIsolation,
    /// Workspace identifier.
    pub workspace_id: WorkspaceId,
    /// Topic identifier.
    pub topic_id: TopicId,
    /// Assigned sandbox, if any.
    pub sandbox_id: Option<SandboxId>,
    /// Prompt text.
    pub prompt: String,
    /// Attached input files.
    pub attachments: Vec<Attachment>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Working directory.
    pub work_dir: String,
    /// Execution mode.
    pub task_mode: TaskMode,
    /// Last failure reason, if any.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a pending task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyPrompt`] when the prompt is blank.
    pub fn new(request: NewTask, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(TaskDomainError::EmptyPrompt);
        }
        let timestamp = clock.utc();

        Ok(Self {
            id: TaskRecordId::new(),
            task_id: request.task_id,
            isolation: request.isolation,
            workspace_id: request.workspace_id,
            topic_id: request.topic_id,
            sandbox_id: None,
            prompt: prompt.to_owned(),
            attachments: request.attachments,
            status: TaskStatus::Pending,
            work_dir: request.work_dir,
            task_mode: request.task_mode,
            error_message: None,
            created_at: timestamp,
            updated_at: timestamp,
            deleted_at: None,
        })
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            task_id: data.task_id,
            isolation: data.isolation,
            workspace_id: data.workspace_id,
            topic_id: data.topic_id,
            sandbox_id: data.sandbox_id,
            prompt: data.prompt,
            attachments: data.attachments,
            status: data.status,
            work_dir: data.work_dir,
            task_mode: data.task_mode,
            error_message: data.error_message,
            created_at: data.created_at,
            updated_at: data.updated_at,
            deleted_at: data.deleted_at,
        }
    }

    /// Returns the surrogate row identifier.
    #[must_use]
    pub const fn id(&self) -> TaskRecordId {
        self.id
    }

    /// Returns the external task identifier.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Returns the owning organization and user.
    #[must_use]
    pub const fn isolation(&self) -> &DataIsolation {
        &self.isolation
    }

    /// Returns the workspace identifier.
    #[must_use]
    pub const fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    /// Returns the topic identifier.
    #[must_use]
    pub const fn topic_id(&self) -> &TopicId {
        &self.topic_id
    }

    /// Returns the assigned sandbox, if any.
    #[must_use]
    pub const fn sandbox_id(&self) -> Option<&SandboxId> {
        self.sandbox_id.as_ref()
    }

    /// Returns the prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Returns the attached input files.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the working directory inside the sandbox.
    #[must_use]
    pub fn work_dir(&self) -> &str {
        &self.work_dir
    }

    /// Returns the execution mode.
    #[must_use]
    pub const fn task_mode(&self) -> TaskMode {
        self.task_mode
    }

    /// Returns the last failure reason, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the soft-deletion timestamp, if deleted.
    #[must_use]
    pub const fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Returns `true` once the task has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns `true` when the task still needs polling or proxying.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_deleted() && !self.status.is_terminal()
    }

    /// Moves the task to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TaskDeleted`] for deleted tasks and
    /// [`TaskDomainError::InvalidTransition`] when the lifecycle forbids the
    /// change.
    pub fn transition_to(
        &mut self,
        next: TaskStatus,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.is_deleted() {
            return Err(TaskDomainError::TaskDeleted(self.task_id.clone()));
        }
        if !self.status.can_transition_to(next) {
            return Err(TaskDomainError::InvalidTransition {
                task_id: self.task_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch(clock);
        Ok(())
    }

    /// Marks the sandbox create call as in flight.
    ///
    /// # Errors
    ///
    /// Returns transition errors from [`Task::transition_to`].
    pub fn begin_sandbox_assignment(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition_to(TaskStatus::SandboxAssigning, clock)
    }

    /// Records the sandbox created for this task.
    ///
    /// Re-recording the same sandbox is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SandboxAlreadyAssigned`] when a different
    /// sandbox is already bound, or [`TaskDomainError::InvalidTransition`]
    /// when no assignment is in flight.
    pub fn assign_sandbox(
        &mut self,
        sandbox_id: SandboxId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        match &self.sandbox_id {
            Some(existing) if *existing == sandbox_id => return Ok(()),
            Some(_) => return Err(TaskDomainError::SandboxAlreadyAssigned(self.task_id.clone())),
            None => {}
        }
        if self.status != TaskStatus::SandboxAssigning {
            return Err(TaskDomainError::InvalidTransition {
                task_id: self.task_id.clone(),
                from: self.status,
                to: TaskStatus::SandboxAssigning,
            });
        }
        self.sandbox_id = Some(sandbox_id);
        self.touch(clock);
        Ok(())
    }

    /// Returns the task to `Pending` after a retryable create failure.
    ///
    /// # Errors
    ///
    /// Returns transition errors from [`Task::transition_to`].
    pub fn retry_assignment(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.transition_to(TaskStatus::Pending, clock)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    /// Marks the sandbox as healthy and the task as running.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SandboxNotAssigned`] without a sandbox, or
    /// transition errors from [`Task::transition_to`].
    pub fn mark_running(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        if self.sandbox_id.is_none() {
            return Err(TaskDomainError::SandboxNotAssigned(self.task_id.clone()));
        }
        self.transition_to(TaskStatus::Running, clock)?;
        self.error_message = None;
        Ok(())
    }

    /// Fails the task with `reason`.
    ///
    /// # Errors
    ///
    /// Returns transition errors from [`Task::transition_to`].
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.transition_to(TaskStatus::Failed, clock)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    /// Completes the task after an explicit success signal.
    ///
    /// # Errors
    ///
    /// Returns transition errors from [`Task::transition_to`].
    pub fn succeed(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition_to(TaskStatus::Succeeded, clock)
    }

    /// Cancels the task.
    ///
    /// # Errors
    ///
    /// Returns transition errors from [`Task::transition_to`].
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition_to(TaskStatus::Cancelled, clock)
    }

    /// Tombstones the task. Deleting twice keeps the first timestamp.
    pub fn soft_delete(&mut self, clock: &impl Clock) {
        if self.deleted_at.is_none() {
            let now = clock.utc();
            self.deleted_at = Some(now);
            self.updated_at = now;
        }
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
