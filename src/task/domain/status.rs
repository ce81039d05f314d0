//! Task status state machine.

use super::ParseTaskStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task, persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no sandbox yet.
    Pending,
    /// Sandbox creation is in flight.
    SandboxAssigning,
    /// Sandbox is healthy and work is being proxied.
    Running,
    /// Finished after an explicit completion signal.
    Succeeded,
    /// Finished unsuccessfully.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl TaskStatus {
    /// Every status, in persisted code order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::SandboxAssigning,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns the persisted status code.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Pending => 0,
            Self::SandboxAssigning => 1,
            Self::Running => 2,
            Self::Succeeded => 3,
            Self::Failed => 4,
            Self::Cancelled => 5,
        }
    }

    /// Returns the canonical text representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SandboxAssigning => "sandbox_assigning",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for statuses no task leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns whether the lifecycle permits moving from `self` to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::SandboxAssigning | Self::Cancelled)
                | (
                    Self::SandboxAssigning,
                    Self::Pending | Self::Running | Self::Failed | Self::Cancelled
                )
                | (Self::Running, Self::Succeeded | Self::Failed | Self::Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i16> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::SandboxAssigning),
            2 => Ok(Self::Running),
            3 => Ok(Self::Succeeded),
            4 => Ok(Self::Failed),
            5 => Ok(Self::Cancelled),
            _ => Err(ParseTaskStatusError(value)),
        }
    }
}

impl From<TaskStatus> for i16 {
    fn from(value: TaskStatus) -> Self {
        value.code()
    }
}
