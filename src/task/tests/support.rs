//! Shared builders for task tests.

use crate::task::{
    domain::{
        Attachment, DataIsolation, FileType, NewTask, NewTaskFile, TaskEvent, TaskId, TaskMode,
        TopicId, WorkspaceId,
    },
    ports::TaskEventListener,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Events received by recording listeners, tagged with the listener name.
pub(super) type EventLog = Arc<Mutex<Vec<(&'static str, TaskEvent)>>>;

pub(super) fn task_id(value: &str) -> TaskId {
    TaskId::new(value).expect("valid task id")
}

pub(super) fn isolation() -> DataIsolation {
    DataIsolation::from_parts("org-1", "user-1").expect("valid isolation")
}

pub(super) fn new_task_in(task: &str, workspace: &str) -> NewTask {
    NewTask {
        task_id: task_id(task),
        isolation: isolation(),
        workspace_id: WorkspaceId::new(workspace).expect("valid workspace"),
        topic_id: TopicId::new("topic-1").expect("valid topic"),
        prompt: "  write the release notes  ".to_owned(),
        attachments: vec![Attachment::new("uploads/changelog.md", "changelog.md", 512)],
        work_dir: "/workspace".to_owned(),
        task_mode: TaskMode::Chat,
    }
}

pub(super) fn new_task(task: &str) -> NewTask {
    new_task_in(task, "ws-1")
}

pub(super) fn new_file(task: &str, file_key: &str) -> NewTaskFile {
    NewTaskFile {
        isolation: isolation(),
        topic_id: TopicId::new("topic-1").expect("valid topic"),
        task_id: task_id(task),
        file_type: FileType::Process,
        file_name: "summary.md".to_owned(),
        file_extension: None,
        file_key: file_key.to_owned(),
        file_size: 128,
        external_url: None,
        menu: None,
        storage_type: None,
    }
}

/// Listener that keeps every event it receives, tagged with its name.
pub(super) struct RecordingListener {
    name: &'static str,
    log: EventLog,
}

impl RecordingListener {
    pub(super) fn new(name: &'static str, log: EventLog) -> Self {
        Self { name, log }
    }
}

#[async_trait]
impl TaskEventListener for RecordingListener {
    async fn on_event(&self, event: &TaskEvent) {
        self.log
            .lock()
            .expect("event log lock")
            .push((self.name, event.clone()));
    }
}

pub(super) fn event_kinds(log: &EventLog) -> Vec<&'static str> {
    log.lock()
        .expect("event log lock")
        .iter()
        .map(|(_, event)| event.kind())
        .collect()
}
