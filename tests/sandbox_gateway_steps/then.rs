//! Then steps for sandbox gateway BDD scenarios.

use super::world::{GatewayWorld, run_async};
use caisson::sandbox::{
    domain::{SandboxId, SandboxState},
    ports::SandboxGateway,
};
use rstest_bdd_macros::then;

fn parse_state(state: &str) -> Result<SandboxState, eyre::Report> {
    SandboxState::try_from(state)
        .map_err(|err| eyre::eyre!("invalid expected state in scenario: {err}"))
}

#[then(r#"the creation succeeds with sandbox "{sandbox_id}""#)]
fn creation_succeeds(world: &GatewayWorld, sandbox_id: String) -> Result<(), eyre::Report> {
    let created = world
        .last_created
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing create result"))?;

    if !created.is_success() || created.sandbox_id() != Some(SandboxId::new(sandbox_id.as_str())) {
        return Err(eyre::eyre!(
            "expected sandbox {sandbox_id} to be created, got {created:?}"
        ));
    }

    Ok(())
}

#[then(r#"the status of sandbox "{sandbox_id}" is "{state}""#)]
fn sandbox_status_is(
    world: &GatewayWorld,
    sandbox_id: String,
    state: String,
) -> Result<(), eyre::Report> {
    let expected = parse_state(&state)?;
    let observed = run_async(world.gateway.get_sandbox_status(&SandboxId::new(sandbox_id)));

    if observed.state() != expected {
        return Err(eyre::eyre!(
            "expected state {expected}, found {}",
            observed.state()
        ));
    }

    Ok(())
}

#[then("exactly {count:usize} sandbox is live")]
fn live_sandbox_count(world: &GatewayWorld, count: usize) -> Result<(), eyre::Report> {
    let live = world.provider.live_sandbox_count();
    if live != count {
        return Err(eyre::eyre!("expected {count} live sandboxes, found {live}"));
    }
    Ok(())
}

#[then(r#"sandbox "{sandbox_id}" is reported as "{state}""#)]
fn batch_reports_state(
    world: &GatewayWorld,
    sandbox_id: String,
    state: String,
) -> Result<(), eyre::Report> {
    let expected = parse_state(&state)?;
    let batch = world
        .last_batch
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing batch result"))?;
    let reported = batch
        .get(&SandboxId::new(sandbox_id.as_str()))
        .ok_or_else(|| eyre::eyre!("sandbox {sandbox_id} missing from batch results"))?;

    if reported.state() != expected {
        return Err(eyre::eyre!(
            "expected {sandbox_id} to be {expected}, found {}",
            reported.state()
        ));
    }
    Ok(())
}

#[then("no sandbox is listed as failed")]
fn no_failed_ids(world: &GatewayWorld) -> Result<(), eyre::Report> {
    let batch = world
        .last_batch
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing batch result"))?;

    if !batch.failed_ids().is_empty() {
        return Err(eyre::eyre!(
            "expected no failed ids, got {:?}",
            batch.failed_ids()
        ));
    }
    Ok(())
}

#[then("the proxied call succeeds with HTTP {status:u16}")]
fn proxied_call_succeeds(world: &GatewayWorld, status: u16) -> Result<(), eyre::Report> {
    let result = world
        .last_proxied
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing proxy result"))?;

    if !result.is_success() || result.status_code() != Some(status) {
        return Err(eyre::eyre!("expected HTTP {status}, got {result:?}"));
    }
    Ok(())
}

#[then(r#"the proxied call fails with "{code}""#)]
fn proxied_call_fails(world: &GatewayWorld, code: String) -> Result<(), eyre::Report> {
    let result = world
        .last_proxied
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing proxy result"))?;

    let reported = result.error_code().map(|found| found.as_str());
    if result.is_success() || reported != Some(code.as_str()) {
        return Err(eyre::eyre!("expected failure {code}, got {result:?}"));
    }
    Ok(())
}

#[then("the provider received no proxied requests")]
fn no_proxied_requests(world: &GatewayWorld) -> Result<(), eyre::Report> {
    let forwarded = world.provider.calls().forward;
    if forwarded != 0 {
        return Err(eyre::eyre!("expected no forwarded calls, saw {forwarded}"));
    }
    Ok(())
}
