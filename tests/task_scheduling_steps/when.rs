//! When steps for task scheduling BDD scenarios.

use super::world::{SchedulingWorld, run_async};
use caisson::task::{domain::TaskId, services::CompletionSignal};
use chrono::TimeDelta;
use eyre::WrapErr;
use rstest_bdd_macros::when;

#[when(r#"a sandbox is assigned to task "{task}""#)]
fn sandbox_assigned(world: &mut SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    let task_id = TaskId::new(task)?;
    run_async(world.scheduler.assign_sandbox(&task_id)).wrap_err("assign sandbox")?;
    Ok(())
}

#[when(r#"the sandbox of task "{task}" becomes ready"#)]
fn sandbox_becomes_ready(world: &mut SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    let sandbox_id = world.sandbox_of(&task)?;
    world
        .provider
        .mark_running(&sandbox_id)
        .wrap_err("mark sandbox running")?;
    Ok(())
}

#[when(r#"the status of task "{task}" is refreshed"#)]
fn status_refreshed(world: &mut SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    let task_id = TaskId::new(task)?;
    run_async(world.scheduler.refresh_status(&task_id)).wrap_err("refresh status")?;
    Ok(())
}

#[when(r#"the agent reports success for task "{task}""#)]
fn agent_reports_success(world: &mut SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    let task_id = TaskId::new(task)?;
    run_async(
        world
            .scheduler
            .complete(&task_id, CompletionSignal::Succeeded),
    )
    .wrap_err("complete task")?;
    Ok(())
}

#[when(r#"the provider evicts the sandbox of task "{task}""#)]
fn provider_evicts_sandbox(world: &mut SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    let sandbox_id = world.sandbox_of(&task)?;
    eyre::ensure!(
        world.provider.evict(&sandbox_id),
        "sandbox {sandbox_id} did not exist"
    );
    Ok(())
}

#[when("the cached status goes stale")]
fn cached_status_goes_stale(world: &mut SchedulingWorld) {
    world.clock.advance(TimeDelta::seconds(4));
}

#[when(r#"task "{task}" is cancelled"#)]
fn task_cancelled(world: &mut SchedulingWorld, task: String) -> Result<(), eyre::Report> {
    let task_id = TaskId::new(task)?;
    world.last_cancel = Some(run_async(world.lifecycle.cancel_task(&task_id)));
    Ok(())
}
