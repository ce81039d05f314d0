//! Runs the sandbox scheduler against `PostgreSQL` and an HTTP sandbox provider.
//!
//! Usage:
//!
//! ```text
//! caisson [config-path]
//! ```
//!
//! Without a path, `caisson.toml` in the working directory is read when it
//! exists and built-in defaults are used otherwise. `CAISSON_*` environment
//! variables override file values in both cases. The process supervises one
//! worker per active task until it receives SIGINT or SIGTERM.

use caisson::config::{AppConfig, ConfigError};
use caisson::sandbox::{
    adapters::HttpSandboxProvider, ports::ProviderError, services::ProviderGateway,
};
use caisson::task::{
    adapters::{
        LoggingEventListener,
        postgres::{PostgresTaskRepository, TaskPgPool},
    },
    ports::TaskRepository,
    services::{TaskEventBus, TaskScheduler},
};
use caisson::telemetry::init_tracing;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "caisson.toml";

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Scheduler = TaskScheduler<
    ProviderGateway<HttpSandboxProvider, DefaultClock>,
    PostgresTaskRepository,
    DefaultClock,
>;

/// Errors that stop the process before or while supervising.
#[derive(Debug, Error)]
enum RunError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open database pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("failed to build sandbox provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] std::io::Error),
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

fn main() -> Result<(), BoxError> {
    let config = load_config(env::args().skip(1))?;
    if !init_tracing(&config.logging) {
        warn!("tracing subscriber already installed; keeping it");
    }
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(RunError::RuntimeInit)?;
    runtime.block_on(run(config)).map_err(Into::into)
}

fn load_config(mut args: impl Iterator<Item = String>) -> Result<AppConfig, RunError> {
    let explicit = args.next().map(PathBuf::from);
    if let Some(extra) = args.next() {
        return Err(RunError::InvalidArgs(format!(
            "unexpected argument '{extra}'; usage: caisson [config-path]"
        )));
    }

    match explicit {
        Some(path) => Ok(AppConfig::load(&path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(AppConfig::load(Path::new(DEFAULT_CONFIG_PATH))?)
        }
        None => {
            let mut config = AppConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn run(config: AppConfig) -> Result<(), RunError> {
    let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
    let pool: TaskPgPool = Pool::builder().build(manager)?;
    let tasks = Arc::new(PostgresTaskRepository::new(pool));
    let clock = Arc::new(DefaultClock);

    let provider = Arc::new(HttpSandboxProvider::new(&config.provider)?);
    let gateway = Arc::new(ProviderGateway::new(
        provider,
        Arc::clone(&clock),
        config.gateway.clone(),
    ));
    let events = TaskEventBus::new().with_listener(Arc::new(LoggingEventListener));
    let scheduler: Arc<Scheduler> = Arc::new(TaskScheduler::new(
        gateway,
        Arc::clone(&tasks),
        Arc::new(events),
        clock,
        config.scheduler.clone(),
    ));

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone())?;
    info!(
        provider = %config.provider.base_url,
        poll_interval_ms = config.scheduler.poll_interval_ms,
        "caisson started"
    );

    let mut ticker = tokio::time::interval(config.scheduler.poll_interval());
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => supervise(&scheduler, &tasks).await,
        }
    }

    info!(workers = scheduler.active_workers(), "shutting down task workers");
    scheduler.shutdown().await;
    Ok(())
}

/// Starts workers for active tasks that have none, then reconciles every
/// bound sandbox through one batched status call.
async fn supervise(scheduler: &Arc<Scheduler>, tasks: &PostgresTaskRepository) {
    let active = match tasks.list_active().await {
        Ok(active) => active,
        Err(err) => {
            warn!(error = %err, "failed to list active tasks");
            return;
        }
    };
    let mut started = 0_usize;
    for task in active {
        if scheduler.spawn_worker(task.task_id().clone()) {
            started += 1;
        }
    }
    if started > 0 {
        info!(started, "task workers started");
    }

    match scheduler.poll_active(None).await {
        Ok(report) => debug!(
            polled = report.polled,
            updated = report.updated,
            superseded = report.superseded,
            unresolved = report.unresolved,
            "sandbox statuses reconciled"
        ),
        Err(err) => error!(error = %err, "batched status reconciliation failed"),
    }
}

fn spawn_signal_listener(shutdown: CancellationToken) -> Result<(), RunError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).map_err(RunError::Signal)?;
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!(error = %err, "interrupt handler failed");
                    }
                }
                _ = terminate.recv() => {}
            }
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }
    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %RunError::Signal(err), "interrupt handler failed");
            }
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }
    Ok(())
}
