//! Event listener that records task events in the trace log.

use crate::task::{domain::TaskEvent, ports::TaskEventListener};
use async_trait::async_trait;
use tracing::info;

/// Writes one structured log line per task event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventListener;

#[async_trait]
impl TaskEventListener for LoggingEventListener {
    async fn on_event(&self, event: &TaskEvent) {
        match event {
            TaskEvent::StatusChanged { task_id, from, to, .. } => {
                info!(task_id = %task_id, from = %from, to = %to, "task status changed");
            }
            TaskEvent::SandboxAssigned {
                task_id,
                sandbox_id,
                ..
            } => {
                info!(task_id = %task_id, sandbox_id = %sandbox_id, "sandbox assigned to task");
            }
            TaskEvent::FileRecorded {
                task_id, file_id, ..
            } => {
                info!(task_id = %task_id, file_id = %file_id, "task file recorded");
            }
            TaskEvent::Deleted {
                task_id,
                files_deleted,
                ..
            } => {
                info!(task_id = %task_id, files_deleted, "task deleted");
            }
            TaskEvent::Created { task_id, .. } => {
                info!(task_id = %task_id, "task created");
            }
        }
    }
}
