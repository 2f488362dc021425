use anyhow::{Context, Result};
use kube::Client;
use node_init_core::{
    DaemonConfig, KubeNodeSource, NetlinkRouteTable, NodeReconciler, Scheduler,
    SystemCommandRunner,
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LOG_FORMAT_ENV: &str = "NODE_INIT_LOG_FORMAT";

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!("{}", fatal_message(&e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = DaemonConfig::from_env().context("Invalid configuration")?;
    info!(
        "Starting node-init for node {} (interval {:?}, pod link {}, peer filter {:?}, policy {})",
        config.node_name,
        config.reconcile_interval,
        config.pod_link,
        config.interface_filter,
        config.peer_failure_policy
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let reconciler = NodeReconciler::new(
        &config,
        Arc::new(KubeNodeSource::new(client)),
        Box::new(NetlinkRouteTable::new()),
        Arc::new(SystemCommandRunner),
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    let scheduler = Scheduler::new(reconciler, config.reconcile_interval, shutdown);
    scheduler
        .run()
        .await
        .context("Error during reconciliation")?;

    Ok(())
}

/// Last line logged before exiting with a failure
fn fatal_message(e: &anyhow::Error) -> String {
    format!("{:#}, dying", e)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Cancel `shutdown` on SIGTERM or SIGINT
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received"),
            _ = sigint.recv() => info!("SIGINT received"),
        }
        shutdown.cancel();
    });

    Ok(())
}
