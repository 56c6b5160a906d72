//! HTTP trigger API
//!
//! - `GET /health`: object store and database reachability
//! - `POST /run`: load the requested exports into staging tables
//! - `POST /consolidate/:load_id`: build the staging views of a load

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::IngestError;
use crate::ingest::pipeline::{IngestPipeline, RunRequest};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
}

pub async fn serve(config: &ServerConfig, pipeline: Arc<IngestPipeline>) -> anyhow::Result<()> {
    let app = create_router(AppState { pipeline });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run))
        .route("/consolidate/:load_id", post(consolidate))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Response {
    match state.pipeline.check_connectivity().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "bucket": state.pipeline.bucket(),
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Response, ApiError> {
    info!(entity = %request.entities, "Run requested");
    let report = state.pipeline.run(&request).await?;

    Ok(Json(json!({
        "status": "success",
        "report": report,
    }))
    .into_response())
}

async fn consolidate(
    State(state): State<AppState>,
    Path(load_id): Path<String>,
) -> Result<Response, ApiError> {
    let views = state.pipeline.consolidate(&load_id).await?;

    Ok(Json(json!({
        "status": "success",
        "load_id": load_id,
        "views": views,
    }))
    .into_response())
}

pub struct ApiError(IngestError);

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        error!("Request failed: {}", self.0);
        (
            status,
            Json(json!({
                "error": self.0.to_string()
            })),
        )
            .into_response()
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
