//! Observed sandbox lifecycle state.

use super::ParseSandboxStateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a sandbox as last observed by the gateway.
///
/// The provider owns ground truth; this is an advisory view used to decide
/// whether to poll, proxy, or give up on a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SandboxState {
    /// The sandbox exists but is not ready to serve requests.
    #[serde(alias = "pending")]
    Pending,
    /// The sandbox is healthy and accepts proxied requests.
    #[serde(alias = "running")]
    Running,
    /// The sandbox could not be reached or reported a failed health check.
    #[serde(alias = "unhealthy")]
    Unhealthy,
    /// The sandbox has shut down.
    #[serde(alias = "stopped")]
    Stopped,
    /// The provider does not know the sandbox.
    #[serde(alias = "not_found")]
    NotFound,
}

impl SandboxState {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Unhealthy => "Unhealthy",
            Self::Stopped => "Stopped",
            Self::NotFound => "NotFound",
        }
    }

    /// Returns `true` when no further work can be sent to the sandbox.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::NotFound)
    }

    /// Returns whether an observation of `target` after `self` follows the
    /// expected lifecycle.
    ///
    /// `NotFound` is reachable from every state and absorbs all others.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (_, Self::NotFound)
                | (Self::Pending, Self::Running | Self::Unhealthy | Self::Stopped)
                | (Self::Running, Self::Unhealthy | Self::Stopped)
                | (Self::Unhealthy, Self::Running | Self::Stopped)
        )
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SandboxState {
    type Error = ParseSandboxStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" | "creating" | "starting" => Ok(Self::Pending),
            "running" | "ready" => Ok(Self::Running),
            "unhealthy" => Ok(Self::Unhealthy),
            "stopped" | "exited" => Ok(Self::Stopped),
            "not_found" | "notfound" => Ok(Self::NotFound),
            _ => Err(ParseSandboxStateError(value.to_owned())),
        }
    }
}
