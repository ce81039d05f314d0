//! Task scheduling from submission to a terminal state.

use super::helpers::{Stack, stack, submission, task_id};
use caisson::sandbox::{
    adapters::InMemorySandboxProvider,
    domain::{GatewayErrorCode, HttpMethod, ProxyRequest, SandboxId},
    ports::ProviderError,
};
use caisson::task::{
    domain::{TaskId, TaskStatus},
    ports::TaskRepository,
    services::{CompletionSignal, SchedulerOutcome, TaskSchedulerError},
};
use eyre::{Result, bail, ensure};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

async fn stored_status(stack: &Stack, task: &TaskId) -> Result<TaskStatus> {
    let Some(found) = stack.tasks.get_by_task_id(task).await? else {
        bail!("task {task} is not stored");
    };
    Ok(found.status())
}

async fn wait_for_status(stack: &Stack, task: &TaskId, expected: TaskStatus) -> Result<()> {
    for _ in 0..200 {
        if stored_status(stack, task).await? == expected {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("task {task} never reached {expected}")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn evicted_sandbox_fails_its_running_task(stack: Stack) -> Result<()> {
    let task = task_id("task-42")?;
    stack.lifecycle.create_task(submission("task-42")?).await?;
    stack.provider.queue_sandbox_id("sbx-abc");
    let sandbox_id = SandboxId::new("sbx-abc");

    let assigned = stack.scheduler.assign_sandbox(&task).await?;
    ensure!(assigned.status() == TaskStatus::SandboxAssigning);
    let pending = stack.scheduler.refresh_status(&task).await?;
    ensure!(matches!(pending, SchedulerOutcome::Unchanged(_)));

    stack.provider.mark_running(&sandbox_id)?;
    let running = stack.scheduler.refresh_status(&task).await?;
    ensure!(running.status() == TaskStatus::Running);

    let reply = stack
        .scheduler
        .forward(&task, ProxyRequest::new(HttpMethod::Post, "/run")?)
        .await?;
    ensure!(reply.is_success() && reply.status_code() == Some(200));

    ensure!(stack.provider.evict(&sandbox_id));
    stack.expire_cached_status();
    let failed = stack.scheduler.refresh_status(&task).await?;

    ensure!(failed.status() == TaskStatus::Failed);
    let Some(stored) = stack.tasks.get_by_task_id(&task).await? else {
        bail!("failed task should remain stored");
    };
    ensure!(stored.sandbox_id() == Some(&sandbox_id));
    ensure!(stored.error_message().is_some());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn terminal_task_issues_no_further_gateway_calls(stack: Stack) -> Result<()> {
    let task = task_id("task-1")?;
    stack.lifecycle.create_task(submission("task-1")?).await?;
    stack.scheduler.assign_sandbox(&task).await?;
    let Some(sandbox_id) = stack
        .tasks
        .get_by_task_id(&task)
        .await?
        .and_then(|found| found.sandbox_id().cloned())
    else {
        bail!("sandbox should be bound");
    };
    stack.provider.mark_running(&sandbox_id)?;
    stack.scheduler.refresh_status(&task).await?;
    stack
        .scheduler
        .complete(&task, CompletionSignal::Succeeded)
        .await?;
    let before = stack.provider.calls();

    let refreshed = stack.scheduler.refresh_status(&task).await?;
    let forwarded = stack
        .scheduler
        .forward(&task, ProxyRequest::new(HttpMethod::Get, "/health")?)
        .await;

    ensure!(refreshed.status() == TaskStatus::Succeeded);
    ensure!(matches!(
        forwarded,
        Err(TaskSchedulerError::TaskNotRunning {
            status: TaskStatus::Succeeded,
            ..
        })
    ));
    ensure!(stack.provider.calls() == before);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transport_failure_returns_task_to_pending_for_retry(stack: Stack) -> Result<()> {
    let task = task_id("task-1")?;
    stack.lifecycle.create_task(submission("task-1")?).await?;
    stack
        .provider
        .fail_next_create(ProviderError::Connect("connection refused".to_owned()));

    let first = stack.scheduler.assign_sandbox(&task).await?;
    let second = stack.scheduler.assign_sandbox(&task).await?;

    ensure!(first.status() == TaskStatus::Pending);
    ensure!(second.status() == TaskStatus::SandboxAssigning);
    ensure!(stack.provider.live_sandbox_count() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_during_assignment_wins_over_late_sandbox() -> Result<()> {
    let stack =
        Stack::over(InMemorySandboxProvider::new().with_latency(Duration::from_millis(100)));
    let task = task_id("task-1")?;
    stack.lifecycle.create_task(submission("task-1")?).await?;

    let scheduler = Arc::clone(&stack.scheduler);
    let assigning = task.clone();
    let assignment = tokio::spawn(async move { scheduler.assign_sandbox(&assigning).await });
    wait_for_status(&stack, &task, TaskStatus::SandboxAssigning).await?;
    stack.lifecycle.cancel_task(&task).await?;

    let outcome = assignment.await??;

    ensure!(matches!(
        outcome,
        SchedulerOutcome::Superseded {
            actual: TaskStatus::Cancelled,
            ..
        }
    ));
    let Some(stored) = stack.tasks.get_by_task_id(&task).await? else {
        bail!("cancelled task should remain stored");
    };
    ensure!(stored.status() == TaskStatus::Cancelled);
    ensure!(stored.sandbox_id().is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn worker_runs_task_until_agent_reports_completion(stack: Stack) -> Result<()> {
    let task = task_id("task-1")?;
    stack.lifecycle.create_task(submission("task-1")?).await?;
    stack.provider.queue_sandbox_id("sbx-worker");

    ensure!(stack.scheduler.spawn_worker(task.clone()));
    wait_for_status(&stack, &task, TaskStatus::SandboxAssigning).await?;
    stack.provider.mark_running(&SandboxId::new("sbx-worker"))?;
    let report = stack.scheduler.poll_active(None).await?;
    ensure!(report.updated == 1);
    ensure!(stored_status(&stack, &task).await? == TaskStatus::Running);
    stack
        .scheduler
        .complete(&task, CompletionSignal::Succeeded)
        .await?;

    for _ in 0..200 {
        if stack.scheduler.active_workers() == 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("worker kept running after the task finished")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn user_cancel_stops_worker_and_task(stack: Stack) -> Result<()> {
    let task = task_id("task-1")?;
    stack.lifecycle.create_task(submission("task-1")?).await?;
    ensure!(stack.scheduler.spawn_worker(task.clone()));
    wait_for_status(&stack, &task, TaskStatus::SandboxAssigning).await?;

    ensure!(stack.scheduler.cancel_worker(&task));
    stack.lifecycle.cancel_task(&task).await?;
    stack.scheduler.shutdown().await;

    ensure!(stored_status(&stack, &task).await? == TaskStatus::Cancelled);
    ensure!(stack.scheduler.active_workers() == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn forward_into_vanished_sandbox_fails_the_task(stack: Stack) -> Result<()> {
    let task = task_id("task-1")?;
    stack.lifecycle.create_task(submission("task-1")?).await?;
    stack.provider.queue_sandbox_id("sbx-gone");
    let sandbox_id = SandboxId::new("sbx-gone");
    stack.scheduler.assign_sandbox(&task).await?;
    stack.provider.mark_running(&sandbox_id)?;
    stack.scheduler.refresh_status(&task).await?;
    ensure!(stack.provider.evict(&sandbox_id));

    let reply = stack
        .scheduler
        .forward(&task, ProxyRequest::new(HttpMethod::Post, "/run")?)
        .await?;

    ensure!(reply.error_code() == Some(GatewayErrorCode::SandboxNotFound));
    ensure!(stored_status(&stack, &task).await? == TaskStatus::Failed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn batched_poll_reconciles_every_bound_task() -> Result<()> {
    let stack = Stack::over(InMemorySandboxProvider::new().with_batch_limit(50));
    for name in ["task-a", "task-b", "task-c"] {
        stack.lifecycle.create_task(submission(name)?).await?;
        stack.provider.queue_sandbox_id(format!("sbx-{name}"));
        stack.scheduler.assign_sandbox(&task_id(name)?).await?;
    }
    stack.lifecycle.create_task(submission("task-unbound")?).await?;
    stack.provider.mark_running(&SandboxId::new("sbx-task-a"))?;
    stack.provider.stop(&SandboxId::new("sbx-task-b"))?;

    let report = stack.scheduler.poll_active(None).await?;

    ensure!(report.polled == 3, "unexpected report {report:?}");
    ensure!(report.updated == 2, "unexpected report {report:?}");
    ensure!(report.unresolved == 0);
    ensure!(stack.provider.batch_sizes() == vec![3]);
    ensure!(stack.provider.calls().status == 0);
    let statuses = [
        stored_status(&stack, &task_id("task-a")?).await?,
        stored_status(&stack, &task_id("task-b")?).await?,
        stored_status(&stack, &task_id("task-c")?).await?,
    ];
    ensure!(statuses == [TaskStatus::Running, TaskStatus::Failed, TaskStatus::SandboxAssigning]);
    Ok(())
}
