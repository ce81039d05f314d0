//! Given steps for sandbox gateway BDD scenarios.

use super::world::{GatewayWorld, run_async};
use caisson::sandbox::{
    domain::{SandboxConfig, SandboxId},
    ports::SandboxGateway,
};
use eyre::WrapErr;
use rstest_bdd_macros::given;

fn create_named(world: &GatewayWorld, sandbox_id: &str) -> Result<SandboxId, eyre::Report> {
    world.provider.queue_sandbox_id(sandbox_id);
    let created = run_async(world.gateway.create_sandbox(SandboxConfig::new()));
    let created_id = created
        .sandbox_id()
        .ok_or_else(|| eyre::eyre!("sandbox creation failed in setup: {created:?}"))?;
    eyre::ensure!(
        created_id.as_str() == sandbox_id,
        "provider assigned {created_id}, expected {sandbox_id}"
    );
    Ok(created_id)
}

#[given("a sandbox provider")]
fn sandbox_provider(world: &GatewayWorld) -> Result<(), eyre::Report> {
    eyre::ensure!(
        world.provider.live_sandbox_count() == 0,
        "scenario must start without sandboxes"
    );
    Ok(())
}

#[given(r#"a sandbox provider that names the next sandbox "{sandbox_id}""#)]
fn provider_with_queued_id(world: &mut GatewayWorld, sandbox_id: String) {
    world.provider.queue_sandbox_id(sandbox_id);
}

#[given(r#"a running sandbox "{sandbox_id}""#)]
fn running_sandbox(world: &mut GatewayWorld, sandbox_id: String) -> Result<(), eyre::Report> {
    let created = create_named(world, &sandbox_id)?;
    world
        .provider
        .mark_running(&created)
        .wrap_err("mark sandbox running in scenario setup")?;
    Ok(())
}

#[given(r#"a stopped sandbox "{sandbox_id}""#)]
fn stopped_sandbox(world: &mut GatewayWorld, sandbox_id: String) -> Result<(), eyre::Report> {
    let created = create_named(world, &sandbox_id)?;
    world
        .provider
        .stop(&created)
        .wrap_err("stop sandbox in scenario setup")?;
    Ok(())
}

#[given(r#"the status of sandbox "{sandbox_id}" has been observed"#)]
fn status_observed(world: &mut GatewayWorld, sandbox_id: String) -> Result<(), eyre::Report> {
    let observed = run_async(
        world
            .gateway
            .get_sandbox_status(&SandboxId::new(sandbox_id.as_str())),
    );
    eyre::ensure!(
        observed.sandbox_id().as_str() == sandbox_id,
        "status answered for {}",
        observed.sandbox_id()
    );
    Ok(())
}
