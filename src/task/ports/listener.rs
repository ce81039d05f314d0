//! Subscriber port for task lifecycle events.

use crate::task::domain::TaskEvent;
use async_trait::async_trait;

/// Receives task events after the corresponding change is persisted.
///
/// Listeners cannot veto a change; failures are theirs to log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskEventListener: Send + Sync {
    /// Handles one event.
    async fn on_event(&self, event: &TaskEvent);
}
