//! Identifier and validated scalar types for the task domain.

use super::TaskDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Surrogate identifier of a persisted task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskRecordId(Uuid);

impl TaskRecordId {
    /// Creates a new random record identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for TaskRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a task file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    /// Creates a new random file identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a file identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declares a trimmed, non-empty string identifier.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier.
            ///
            /// # Errors
            ///
            /// Returns [`TaskDomainError::EmptyIdentifier`] when the value is
            /// empty after trimming.
            pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
                let raw = value.into();
                let normalized = raw.trim();
                if normalized.is_empty() {
                    return Err(TaskDomainError::EmptyIdentifier($field));
                }
                Ok(Self(normalized.to_owned()))
            }

            /// Returns the identifier as `str`.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = TaskDomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// External-facing task identifier, also used as the sandbox idempotency key.
    TaskId,
    "task_id"
);

string_id!(
    /// Identifier of the user who owns a task or file.
    UserId,
    "user_id"
);

string_id!(
    /// Identifier of the workspace a task runs against.
    WorkspaceId,
    "workspace_id"
);

string_id!(
    /// Identifier of the conversation topic a task belongs to.
    TopicId,
    "topic_id"
);

string_id!(
    /// Code of the organization that scopes persisted rows.
    OrganizationCode,
    "organization_code"
);

/// Authentication-derived scope applied to every persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataIsolation {
    organization_code: OrganizationCode,
    user_id: UserId,
}

impl DataIsolation {
    /// Creates an isolation scope.
    #[must_use]
    pub const fn new(organization_code: OrganizationCode, user_id: UserId) -> Self {
        Self {
            organization_code,
            user_id,
        }
    }

    /// Creates an isolation scope from raw values.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyIdentifier`] when either value is blank.
    pub fn from_parts(organization_code: &str, user_id: &str) -> Result<Self, TaskDomainError> {
        Ok(Self::new(
            OrganizationCode::new(organization_code)?,
            UserId::new(user_id)?,
        ))
    }

    /// Returns the organization code.
    #[must_use]
    pub const fn organization_code(&self) -> &OrganizationCode {
        &self.organization_code
    }

    /// Returns the user identifier.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }
}
