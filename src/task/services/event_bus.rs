//! Ordered fan-out of task events to registered listeners.

use crate::task::{domain::TaskEvent, ports::TaskEventListener};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Publishes each event to every listener in registration order.
#[derive(Clone, Default)]
pub struct TaskEventBus {
    listeners: Vec<Arc<dyn TaskEventListener>>,
}

impl TaskEventBus {
    /// Creates a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn TaskEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Delivers `event` to each listener, awaiting one before the next.
    pub async fn publish(&self, event: &TaskEvent) {
        debug!(
            task_id = %event.task_id(),
            kind = event.kind(),
            listeners = self.listeners.len(),
            "publishing task event"
        );
        for listener in &self.listeners {
            listener.on_event(event).await;
        }
    }
}

impl fmt::Debug for TaskEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
