//! Port contracts for task lifecycle management.
//!
//! Ports define infrastructure-agnostic interfaces used by task services.

pub mod file;
pub mod listener;
pub mod repository;

pub use file::{TaskFileRepository, TaskFileRepositoryError, TaskFileRepositoryResult};
pub use listener::TaskEventListener;
pub use repository::{TaskRepository, TaskRepositoryError, TaskRepositoryResult};

#[cfg(test)]
pub use file::MockTaskFileRepository;
#[cfg(test)]
pub use listener::MockTaskEventListener;
#[cfg(test)]
pub use repository::MockTaskRepository;
