//! Then steps for task scheduling BDD scenarios.

use super::world::SchedulingWorld;
use caisson::task::{
    domain::{TaskDomainError, TaskStatus},
    services::TaskLifecycleError,
};
use rstest_bdd_macros::then;

#[then(r#"task "{task}" is "{status}""#)]
fn task_has_status(
    world: &SchedulingWorld,
    task: String,
    status: String,
) -> Result<(), eyre::Report> {
    let stored = world.stored(&task)?;
    if stored.status().as_str() != status {
        return Err(eyre::eyre!(
            "expected task {task} to be {status}, found {}",
            stored.status()
        ));
    }
    Ok(())
}

#[then(r#"task "{task}" keeps its sandbox"#)]
fn task_keeps_sandbox(world: &SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    world.sandbox_of(&task)?;
    Ok(())
}

#[then("the cancellation is rejected as an invalid transition")]
fn cancellation_rejected(world: &SchedulingWorld) -> Result<(), eyre::Report> {
    match &world.last_cancel {
        Some(Err(TaskLifecycleError::Domain(TaskDomainError::InvalidTransition {
            from: TaskStatus::Cancelled,
            to: TaskStatus::Cancelled,
            ..
        }))) => Ok(()),
        other => Err(eyre::eyre!("expected an invalid transition, got {other:?}")),
    }
}
