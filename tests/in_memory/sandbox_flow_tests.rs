//! Gateway behaviour across the lifetime of one sandbox.

use super::helpers::{Stack, stack};
use caisson::sandbox::{
    domain::{
        GatewayErrorCode, HttpMethod, IdempotencyKey, ProxyRequest, ProxyResponse, SandboxConfig,
        SandboxId, SandboxState,
    },
    ports::SandboxGateway,
};
use eyre::{Result, ensure};
use rstest::rstest;
use serde_json::{Map, Value, json};

fn agent_config(key: &str) -> Result<SandboxConfig> {
    Ok(SandboxConfig::new()
        .with("image", "agent-v1")
        .with_idempotency_key(&IdempotencyKey::new(key)?))
}

fn run_request(prompt: &str) -> Result<ProxyRequest> {
    let mut data = Map::new();
    data.insert("prompt".to_owned(), Value::from(prompt));
    Ok(ProxyRequest::new(HttpMethod::Post, "/run")?.with_data(data))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sandbox_is_created_polled_proxied_and_evicted(stack: Stack) -> Result<()> {
    stack.provider.queue_sandbox_id("sbx-abc");
    stack.provider.respond(
        HttpMethod::Post,
        "/run",
        ProxyResponse::new(200, json!({"accepted": true})),
    );

    let created = stack.gateway.create_sandbox(agent_config("task-42")?).await;
    ensure!(created.is_success(), "create failed: {created:?}");
    let sandbox_id = SandboxId::new("sbx-abc");
    ensure!(created.sandbox_id() == Some(sandbox_id.clone()));

    let initial = stack.gateway.get_sandbox_status(&sandbox_id).await;
    ensure!(initial.state() == SandboxState::Pending);

    stack.provider.mark_running(&sandbox_id)?;
    let ready = stack.gateway.get_sandbox_status(&sandbox_id).await;
    ensure!(ready.state() == SandboxState::Running);

    let proxied = stack
        .gateway
        .proxy_sandbox_request(&sandbox_id, run_request("list open incidents")?)
        .await;
    ensure!(proxied.is_success(), "proxy failed: {proxied:?}");
    ensure!(proxied.status_code() == Some(200));
    ensure!(proxied.body() == Some(&json!({"accepted": true})));

    ensure!(stack.provider.evict(&sandbox_id));
    stack.expire_cached_status();
    let evicted = stack.gateway.get_sandbox_status(&sandbox_id).await;
    ensure!(evicted.state() == SandboxState::NotFound);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn retried_create_with_same_key_leaves_one_live_sandbox(stack: Stack) -> Result<()> {
    let first = stack.gateway.create_sandbox(agent_config("task-7")?).await;
    let second = stack.gateway.create_sandbox(agent_config("task-7")?).await;

    ensure!(first.is_success() && second.is_success());
    ensure!(first.sandbox_id() == second.sandbox_id());
    ensure!(stack.provider.live_sandbox_count() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn running_status_is_served_from_cache_until_it_goes_stale(stack: Stack) -> Result<()> {
    let created = stack.gateway.create_sandbox(agent_config("task-8")?).await;
    let Some(sandbox_id) = created.sandbox_id() else {
        eyre::bail!("create returned no sandbox id: {created:?}");
    };
    stack.provider.mark_running(&sandbox_id)?;
    stack.gateway.get_sandbox_status(&sandbox_id).await;
    let queried = stack.provider.calls().status;

    stack.provider.stop(&sandbox_id)?;
    let cached = stack.gateway.get_sandbox_status(&sandbox_id).await;
    ensure!(cached.state() == SandboxState::Running);
    ensure!(stack.provider.calls().status == queried);

    stack.expire_cached_status();
    let fresh = stack.gateway.get_sandbox_status(&sandbox_id).await;
    ensure!(fresh.state() == SandboxState::Stopped);
    ensure!(stack.provider.calls().status == queried + 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopped_sandbox_repolls_as_stopped_without_side_effects(stack: Stack) -> Result<()> {
    let created = stack.gateway.create_sandbox(agent_config("task-9")?).await;
    let Some(sandbox_id) = created.sandbox_id() else {
        eyre::bail!("create returned no sandbox id: {created:?}");
    };
    stack.provider.stop(&sandbox_id)?;

    for _ in 0..3 {
        let polled = stack.gateway.get_sandbox_status(&sandbox_id).await;
        ensure!(polled.state() == SandboxState::Stopped);
    }
    ensure!(stack.provider.config_of(&sandbox_id).is_some());
    ensure!(stack.provider.calls().create == 1);
    ensure!(stack.provider.calls().forward == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn proxy_to_known_dead_sandbox_fails_without_network_call(stack: Stack) -> Result<()> {
    let created = stack.gateway.create_sandbox(agent_config("task-10")?).await;
    let Some(sandbox_id) = created.sandbox_id() else {
        eyre::bail!("create returned no sandbox id: {created:?}");
    };
    stack.provider.stop(&sandbox_id)?;
    stack.gateway.get_sandbox_status(&sandbox_id).await;

    let proxied = stack
        .gateway
        .proxy_sandbox_request(&sandbox_id, run_request("anything")?)
        .await;

    ensure!(!proxied.is_success());
    ensure!(proxied.error_code() == Some(GatewayErrorCode::SandboxNotFound));
    ensure!(stack.provider.calls().forward == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn upstream_errors_are_passed_through_once(stack: Stack) -> Result<()> {
    let created = stack.gateway.create_sandbox(agent_config("task-11")?).await;
    let Some(sandbox_id) = created.sandbox_id() else {
        eyre::bail!("create returned no sandbox id: {created:?}");
    };
    stack.provider.mark_running(&sandbox_id)?;
    stack.provider.respond(
        HttpMethod::Post,
        "/run",
        ProxyResponse::new(422, json!({"error": "prompt too long"})),
    );

    let proxied = stack
        .gateway
        .proxy_sandbox_request(&sandbox_id, run_request("x")?)
        .await;

    ensure!(proxied.error_code() == Some(GatewayErrorCode::UpstreamError));
    ensure!(proxied.status_code() == Some(422));
    ensure!(proxied.body() == Some(&json!({"error": "prompt too long"})));
    ensure!(stack.provider.calls().forward == 1);
    Ok(())
}
