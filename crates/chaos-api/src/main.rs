//! Chaos API - management endpoints for ChaosExperiment resources

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use chaos_api::{router, serve, with_dashboard, ApiState, KubeExperimentApi};
use chaos_common::kube_utils::create_client;
use chaos_common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

/// Chaos API - list, create and delete chaos experiments over HTTP
#[derive(Parser, Debug)]
#[command(name = "chaos-api", version, about, long_about = None)]
struct Cli {
    /// Path to a kubeconfig file (defaults to $KUBECONFIG, ~/.kube/config, then in-cluster)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Directory of dashboard assets served for paths outside the API
    #[arg(long, env = "DASHBOARD_DIR", default_value = "./dashboard/build")]
    dashboard_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if let Err(e) = init_telemetry(TelemetryConfig::for_service("chaos-api")) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    let result = run(cli).await;
    shutdown_telemetry();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = create_client(cli.kubeconfig.as_deref(), None)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let state = ApiState::new(Arc::new(KubeExperimentApi::new(client)));
    let app = with_dashboard(router(state), &cli.dashboard_dir);
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));

    serve(addr, app, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down management API");
    })
    .await?;
    Ok(())
}
