//! File artifacts produced or consumed by tasks.

use super::{DataIsolation, FileId, ParseTaskFieldError, TaskDomainError, TaskId, TopicId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest file size representable in the persisted schema.
const MAX_PERSISTED_FILE_SIZE: u64 = i64::MAX.unsigned_abs();

/// Store that holds the bytes referenced by a file key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Workspace-scoped store.
    #[default]
    Workspace,
    /// Topic-scoped store.
    Topic,
    /// Point-in-time snapshot store.
    Snapshot,
}

impl StorageType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Topic => "topic",
            Self::Snapshot => "snapshot",
        }
    }

    /// Parses a persisted value, treating absent or blank values as
    /// [`StorageType::Workspace`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseTaskFieldError`] for unknown values.
    pub fn from_persisted(value: Option<&str>) -> Result<Self, ParseTaskFieldError> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::Workspace),
            Some(raw) => Self::try_from(raw),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StorageType {
    type Error = ParseTaskFieldError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "workspace" => Ok(Self::Workspace),
            "topic" => Ok(Self::Topic),
            "snapshot" => Ok(Self::Snapshot),
            _ => Err(ParseTaskFieldError::new("storage type", value)),
        }
    }
}

/// Origin of a task file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Uploaded by the user as prompt input.
    UserUpload,
    /// Produced by the agent while working.
    Process,
    /// Captured from the sandbox browser.
    Browser,
    /// Generated automatically by the platform.
    SystemAuto,
}

impl FileType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserUpload => "user_upload",
            Self::Process => "process",
            Self::Browser => "browser",
            Self::SystemAuto => "system_auto",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for FileType {
    type Error = ParseTaskFieldError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user_upload" => Ok(Self::UserUpload),
            "process" => Ok(Self::Process),
            "browser" => Ok(Self::Browser),
            "system_auto" => Ok(Self::SystemAuto),
            _ => Err(ParseTaskFieldError::new("file type", value)),
        }
    }
}

/// Parameters for recording a new task file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskFile {
    /// Owning organization and user.
    pub isolation: DataIsolation,
    /// Topic the file belongs to.
    pub topic_id: TopicId,
    /// Task the file belongs to.
    pub task_id: TaskId,
    /// Origin of the file.
    pub file_type: FileType,
    /// Display name.
    pub file_name: String,
    /// Extension without the dot; derived from the name when absent.
    pub file_extension: Option<String>,
    /// Storage-relative path.
    pub file_key: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Publicly reachable URL, if any.
    pub external_url: Option<String>,
    /// Display grouping.
    pub menu: Option<String>,
    /// Store holding the bytes; workspace when absent.
    pub storage_type: Option<StorageType>,
}

/// A file artifact associated with a task.
///
/// Only the storage location may change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFile {
    file_id: FileId,
    isolation: DataIsolation,
    topic_id: TopicId,
    task_id: TaskId,
    file_type: FileType,
    file_name: String,
    file_extension: String,
    file_key: String,
    file_size: u64,
    external_url: Option<String>,
    menu: Option<String>,
    storage_type: StorageType,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted task file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskFileData {
    /// File identifier.
    pub file_id: FileId,
    /// Owning organization and user.
    pub isolation: DataIsolation,
    /// Topic identifier.
    pub topic_id: TopicId,
    /// Owning task identifier.
    pub task_id: TaskId,
    /// Origin of the file.
    pub file_type: FileType,
    /// Display name.
    pub file_name: String,
    /// Extension without the dot.
    pub file_extension: String,
    /// Storage-relative path.
    pub file_key: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Publicly reachable URL, if any.
    pub external_url: Option<String>,
    /// Display grouping.
    pub menu: Option<String>,
    /// Store holding the bytes.
    pub storage_type: StorageType,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TaskFile {
    /// Creates a task file record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidFileKey`] when the key is absolute,
    /// empty, or contains `..`, and [`TaskDomainError::FileTooLarge`] when the
    /// size cannot be persisted.
    pub fn new(request: NewTaskFile, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        let file_key = validate_file_key(&request.file_key)?;
        if request.file_size > MAX_PERSISTED_FILE_SIZE {
            return Err(TaskDomainError::FileTooLarge(request.file_size));
        }
        let file_extension = request
            .file_extension
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| derive_extension(&request.file_name));
        let timestamp = clock.utc();

        Ok(Self {
            file_id: FileId::new(),
            isolation: request.isolation,
            topic_id: request.topic_id,
            task_id: request.task_id,
            file_type: request.file_type,
            file_name: request.file_name,
            file_extension,
            file_key,
            file_size: request.file_size,
            external_url: request.external_url,
            menu: request.menu,
            storage_type: request.storage_type.unwrap_or_default(),
            created_at: timestamp,
            updated_at: timestamp,
            deleted_at: None,
        })
    }

    /// Reconstructs a file from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskFileData) -> Self {
        Self {
            file_id: data.file_id,
            isolation: data.isolation,
            topic_id: data.topic_id,
            task_id: data.task_id,
            file_type: data.file_type,
            file_name: data.file_name,
            file_extension: data.file_extension,
            file_key: data.file_key,
            file_size: data.file_size,
            external_url: data.external_url,
            menu: data.menu,
            storage_type: data.storage_type,
            created_at: data.created_at,
            updated_at: data.updated_at,
            deleted_at: data.deleted_at,
        }
    }

    /// Returns the file identifier.
    #[must_use]
    pub const fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Returns the owning organization and user.
    #[must_use]
    pub const fn isolation(&self) -> &DataIsolation {
        &self.isolation
    }

    /// Returns the topic identifier.
    #[must_use]
    pub const fn topic_id(&self) -> &TopicId {
        &self.topic_id
    }

    /// Returns the owning task identifier.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Returns the origin of the file.
    #[must_use]
    pub const fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Returns the display name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the extension without the dot; empty when unknown.
    #[must_use]
    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    /// Returns the storage-relative path.
    #[must_use]
    pub fn file_key(&self) -> &str {
        &self.file_key
    }

    /// Returns the size in bytes.
    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the external URL, if any.
    #[must_use]
    pub fn external_url(&self) -> Option<&str> {
        self.external_url.as_deref()
    }

    /// Returns the display grouping, if any.
    #[must_use]
    pub fn menu(&self) -> Option<&str> {
        self.menu.as_deref()
    }

    /// Returns the store holding the bytes.
    #[must_use]
    pub const fn storage_type(&self) -> StorageType {
        self.storage_type
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

    /// Returns `true` once the file has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Records where the bytes now live.
    pub fn backfill_storage(
        &mut self,
        storage_type: StorageType,
        external_url: Option<String>,
        clock: &impl Clock,
    ) {
        self.storage_type = storage_type;
        if external_url.is_some() {
            self.external_url = external_url;
        }
        self.updated_at = clock.utc();
    }

    /// Tombstones the file. Deleting twice keeps the first timestamp.
    pub fn soft_delete(&mut self, clock: &impl Clock) {
        if self.deleted_at.is_none() {
            let now = clock.utc();
            self.deleted_at = Some(now);
            self.updated_at = now;
        }
    }
}

fn validate_file_key(raw: &str) -> Result<String, TaskDomainError> {
    let key = raw.trim();
    let is_valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.starts_with('\\')
        && !key.split(['/', '\\']).any(|segment| segment == "..");
    if !is_valid {
        return Err(TaskDomainError::InvalidFileKey(raw.to_owned()));
    }
    Ok(key.to_owned())
}

fn derive_extension(file_name: &str) -> String {
    file_name
        .trim()
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}
