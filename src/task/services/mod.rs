//! Application services for task lifecycle orchestration.

mod event_bus;
mod lifecycle;
mod scheduler;

pub use event_bus::TaskEventBus;
pub use lifecycle::{TaskLifecycleError, TaskLifecycleResult, TaskLifecycleService};
pub use scheduler::{
    CompletionSignal, PollReport, SchedulerOutcome, TaskScheduler, TaskSchedulerError,
    TaskSchedulerResult,
};
