//! In-memory adapters for task and file persistence.

mod file;
mod task;

pub use file::InMemoryTaskFileRepository;
pub use task::InMemoryTaskRepository;
