//! When steps for sandbox gateway BDD scenarios.

use super::world::{GatewayWorld, run_async};
use caisson::sandbox::{
    domain::{HttpMethod, IdempotencyKey, ProxyRequest, SandboxConfig, SandboxId},
    ports::SandboxGateway,
};
use chrono::TimeDelta;
use eyre::WrapErr;
use rstest_bdd_macros::when;

#[when(r#"a sandbox is created with idempotency key "{key}""#)]
fn create_with_key(world: &mut GatewayWorld, key: String) -> Result<(), eyre::Report> {
    let idempotency_key = IdempotencyKey::new(key).wrap_err("parse idempotency key")?;
    let config = SandboxConfig::new()
        .with("image", "agent-v1")
        .with_idempotency_key(&idempotency_key);
    world.last_created = Some(run_async(world.gateway.create_sandbox(config)));
    Ok(())
}

#[when(r#"sandbox "{sandbox_id}" becomes ready"#)]
fn sandbox_becomes_ready(world: &mut GatewayWorld, sandbox_id: String) -> Result<(), eyre::Report> {
    world
        .provider
        .mark_running(&SandboxId::new(sandbox_id))
        .wrap_err("mark sandbox running")?;
    Ok(())
}

#[when(r#""{method}" "{path}" is proxied to sandbox "{sandbox_id}""#)]
fn proxy_request(
    world: &mut GatewayWorld,
    method: String,
    path: String,
    sandbox_id: String,
) -> Result<(), eyre::Report> {
    let parsed = HttpMethod::try_from(method.as_str()).wrap_err("parse HTTP method")?;
    let request = ProxyRequest::new(parsed, path).wrap_err("build proxy request")?;
    let result = run_async(
        world
            .gateway
            .proxy_sandbox_request(&SandboxId::new(sandbox_id), request),
    );
    world.last_proxied = Some(result);
    Ok(())
}

#[when(r#"the provider evicts sandbox "{sandbox_id}""#)]
fn provider_evicts(world: &mut GatewayWorld, sandbox_id: String) -> Result<(), eyre::Report> {
    eyre::ensure!(
        world.provider.evict(&SandboxId::new(sandbox_id.as_str())),
        "sandbox {sandbox_id} did not exist"
    );
    Ok(())
}

#[when("the cached status goes stale")]
fn cached_status_goes_stale(world: &mut GatewayWorld) {
    world.clock.advance(TimeDelta::seconds(4));
}

#[when(r#"the batch status of "{sandbox_ids}" is requested"#)]
fn batch_status_requested(world: &mut GatewayWorld, sandbox_ids: String) {
    let ids: Vec<SandboxId> = sandbox_ids.split(',').map(SandboxId::from).collect();
    world.last_batch = Some(run_async(world.gateway.get_batch_sandbox_status(&ids)));
}
