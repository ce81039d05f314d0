//! Given steps for task scheduling BDD scenarios.

use super::world::{SchedulingWorld, run_async, submission};
use caisson::sandbox::ports::ProviderError;
use caisson::task::domain::{TaskId, TaskStatus};
use eyre::WrapErr;
use rstest_bdd_macros::given;

#[given(r#"a submitted task "{task}""#)]
fn submitted_task(world: &mut SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    run_async(world.lifecycle.create_task(submission(&task)?)).wrap_err("submit task")?;
    Ok(())
}

#[given(r#"task "{task}" is running"#)]
fn task_is_running(world: &mut SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    let task_id = TaskId::new(task.as_str())?;
    run_async(world.scheduler.assign_sandbox(&task_id)).wrap_err("assign sandbox")?;
    let sandbox_id = world.sandbox_of(&task)?;
    world
        .provider
        .mark_running(&sandbox_id)
        .wrap_err("mark sandbox running")?;
    let outcome = run_async(world.scheduler.refresh_status(&task_id)).wrap_err("refresh")?;
    eyre::ensure!(
        outcome.status() == TaskStatus::Running,
        "task {task} did not start: {outcome:?}"
    );
    Ok(())
}

#[given("the provider refuses the next connection")]
fn provider_refuses_connection(world: &mut SchedulingWorld) {
    world
        .provider
        .fail_next_create(ProviderError::Connect("connection refused".to_owned()));
}

#[given("the provider rejects the next creation")]
fn provider_rejects_creation(world: &mut SchedulingWorld) {
    world
        .provider
        .fail_next_create(ProviderError::Rejected("image not allowed".to_owned()));
}
