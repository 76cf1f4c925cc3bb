//! HTTP routes

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::services::ServeDir;
use tracing::info;

use crate::error::Result;
use crate::store::ExperimentApi;
use crate::types::{CreateExperimentRequest, ExperimentSummary};

/// Shared state for handlers
#[derive(Clone)]
pub struct ApiState {
    /// Experiment store
    pub experiments: Arc<dyn ExperimentApi>,
}

impl ApiState {
    /// State over the given store
    pub fn new(experiments: Arc<dyn ExperimentApi>) -> Self {
        Self { experiments }
    }
}

/// Build the API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/api/experiments",
            get(list_experiments).post(create_experiment),
        )
        .route(
            "/api/experiments/{namespace}/{name}",
            get(get_experiment).delete(delete_experiment),
        )
        .with_state(state)
}

/// Serve files under `dir` for every path the API does not route
pub fn with_dashboard(app: Router, dir: impl AsRef<FsPath>) -> Router {
    app.fallback_service(ServeDir::new(dir.as_ref()))
}

/// Serve `app` on `addr` until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        chaos_common::Error::internal_with_context("bind", format!("{}: {}", addr, e))
    })?;
    info!(addr = %addr, "Starting management API");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| chaos_common::Error::internal_with_context("serve", e.to_string()))?;
    Ok(())
}

async fn list_experiments(State(state): State<ApiState>) -> Result<Json<Vec<ExperimentSummary>>> {
    let experiments = state.experiments.list().await?;
    Ok(Json(experiments.iter().map(ExperimentSummary::from).collect()))
}

async fn get_experiment(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<ExperimentSummary>> {
    let experiment = state.experiments.get(&namespace, &name).await?;
    Ok(Json(ExperimentSummary::from(&experiment)))
}

async fn create_experiment(
    State(state): State<ApiState>,
    Json(request): Json<CreateExperimentRequest>,
) -> Result<(StatusCode, Json<ExperimentSummary>)> {
    let experiment = request.into_experiment()?;
    let created = state.experiments.create(&experiment).await?;
    info!(
        experiment = %created.key(),
        experiment_type = %created.spec.experiment_type,
        "Experiment created"
    );
    Ok((StatusCode::CREATED, Json(ExperimentSummary::from(&created))))
}

async fn delete_experiment(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.experiments.delete(&namespace, &name).await?;
    info!(namespace = %namespace, name = %name, "Experiment deleted");
    Ok(StatusCode::NO_CONTENT)
}
