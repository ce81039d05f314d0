//! Batched status coverage and provider fan-out.

use super::helpers::Stack;
use caisson::sandbox::{
    adapters::InMemorySandboxProvider,
    domain::{BatchStatusResult, SandboxConfig, SandboxId, SandboxState, SandboxStatusResult},
    ports::{ProviderError, SandboxGateway},
};
use eyre::{Result, ensure};
use rstest::rstest;

fn state_of(batch: &BatchStatusResult, sandbox_id: &str) -> Option<SandboxState> {
    batch
        .get(&SandboxId::new(sandbox_id))
        .map(SandboxStatusResult::state)
}

async fn create_named(stack: &Stack, sandbox_id: &str) -> Result<SandboxId> {
    stack.provider.queue_sandbox_id(sandbox_id);
    let created = stack.gateway.create_sandbox(SandboxConfig::new()).await;
    created
        .sandbox_id()
        .ok_or_else(|| eyre::eyre!("create returned no sandbox id: {created:?}"))
}

#[rstest]
#[case::without_native_batch(InMemorySandboxProvider::new())]
#[case::with_native_batch(InMemorySandboxProvider::new().with_batch_limit(10))]
#[tokio::test(flavor = "multi_thread")]
async fn missing_sandbox_resolves_to_not_found(
    #[case] provider: InMemorySandboxProvider,
) -> Result<()> {
    let stack = Stack::over(provider);
    let running = create_named(&stack, "sbx-1").await?;
    let stopped = create_named(&stack, "sbx-2").await?;
    stack.provider.mark_running(&running)?;
    stack.provider.stop(&stopped)?;
    let ids = [running, stopped, SandboxId::new("sbx-missing")];

    let batch = stack.gateway.get_batch_sandbox_status(&ids).await;

    ensure!(state_of(&batch, "sbx-1") == Some(SandboxState::Running));
    ensure!(state_of(&batch, "sbx-2") == Some(SandboxState::Stopped));
    ensure!(state_of(&batch, "sbx-missing") == Some(SandboxState::NotFound));
    ensure!(batch.failed_ids().is_empty());
    ensure!(batch.len() == ids.len());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn native_batches_are_chunked_to_provider_limit() -> Result<()> {
    let stack = Stack::over(InMemorySandboxProvider::new().with_batch_limit(2));
    let mut ids = Vec::new();
    for index in 1..=5 {
        ids.push(create_named(&stack, &format!("sbx-{index}")).await?);
    }

    let batch = stack.gateway.get_batch_sandbox_status(&ids).await;

    ensure!(batch.covers(&ids));
    ensure!(batch.len() == 5);
    let mut sizes = stack.provider.batch_sizes();
    sizes.sort_unstable();
    ensure!(sizes == vec![1, 2, 2], "unexpected batch sizes {sizes:?}");
    ensure!(stack.provider.calls().status == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_chunk_lists_every_member_as_failed() -> Result<()> {
    let stack = Stack::over(InMemorySandboxProvider::new().with_batch_limit(10));
    let first = create_named(&stack, "sbx-1").await?;
    let second = create_named(&stack, "sbx-2").await?;
    stack
        .provider
        .fail_next_status(ProviderError::Connect("connection reset".to_owned()));
    let ids = [first.clone(), second.clone()];

    let batch = stack.gateway.get_batch_sandbox_status(&ids).await;

    ensure!(batch.results().is_empty());
    ensure!(batch.is_failed(&first) && batch.is_failed(&second));
    ensure!(batch.len() == ids.len());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_and_malformed_ids_are_each_answered_once() -> Result<()> {
    let stack = Stack::over(InMemorySandboxProvider::new());
    let sandbox = create_named(&stack, "sbx-1").await?;
    let bad = SandboxId::new("sbx/../etc");
    let ids = [sandbox.clone(), sandbox.clone(), bad.clone()];

    let batch = stack.gateway.get_batch_sandbox_status(&ids).await;

    ensure!(batch.len() == 2);
    ensure!(batch.get(&bad).map(SandboxStatusResult::state) == Some(SandboxState::NotFound));
    ensure!(batch.get(&sandbox).map(SandboxStatusResult::state) == Some(SandboxState::Pending));
    ensure!(stack.provider.calls().status == 1);
    Ok(())
}
