//! Chaos controller - runs ChaosExperiment resources to completion

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use chaos_common::kube_utils::{create_client, crd_yaml, ensure_crd};
use chaos_common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use chaos_common::{DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKER_COUNT};
use chaos_controller::ControllerConfig;

/// Chaos controller - applies and reverts ChaosExperiment disruptions
#[derive(Parser, Debug)]
#[command(name = "chaos-controller", version, about, long_about = None)]
struct Cli {
    /// Path to a kubeconfig file (defaults to $KUBECONFIG, ~/.kube/config, then in-cluster)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Override the API server address
    #[arg(long)]
    master: Option<String>,

    /// Number of concurrent reconcile workers
    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Seconds between full resyncs of every experiment
    #[arg(long, default_value_t = DEFAULT_RESYNC_INTERVAL_SECS)]
    resync_interval: u64,

    /// Install or update the ChaosExperiment CRD before starting
    #[arg(long)]
    install_crd: bool,

    /// Print the CRD manifest and exit
    #[arg(long)]
    crd: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider before any TLS client is built
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The controller cannot reach the API server without a working TLS implementation.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crd_yaml()?);
        return Ok(());
    }

    if let Err(e) = init_telemetry(TelemetryConfig::for_service("chaos-controller")) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    let result = run(cli).await;
    shutdown_telemetry();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = create_client(cli.kubeconfig.as_deref(), cli.master.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if cli.install_crd {
        tracing::info!("Installing ChaosExperiment CRD...");
        ensure_crd(&client)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install ChaosExperiment CRD: {}", e))?;
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let config = ControllerConfig {
        workers: cli.workers,
        resync_interval: Duration::from_secs(cli.resync_interval.max(1)),
        ..Default::default()
    };
    tracing::info!(
        workers = config.workers,
        resync_interval_secs = config.resync_interval.as_secs(),
        "Starting chaos controller"
    );

    chaos_controller::run(client, config, shutdown).await?;
    tracing::info!("Chaos controller exited cleanly");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, listening for SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    shutdown.cancel();
}
