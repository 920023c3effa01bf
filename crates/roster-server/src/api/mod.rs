//! HTTP routes
//!
//! | Route               | Purpose                                   |
//! |---------------------|-------------------------------------------|
//! | `GET /`             | Welcome document listing the routes       |
//! | `GET /health`       | Storage reachability                      |
//! | `POST /upload`      | Upload a CSV file and start ingesting it  |
//! | `GET /runs`         | Runs started by this process              |
//! | `GET /runs/:run_id` | State and summary of one run              |
//! | `GET /records`      | Paginated, sorted employee records        |
//! | `GET /count`        | Total stored records                      |
//! | `GET /logs`         | Filtered view of the JSON log file        |

pub mod logs;
pub mod records;
pub mod runs;
pub mod upload;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use roster_ingest::{IngestError, IngestPipeline, PipelineConfig};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::middleware;
use crate::runs::RunRegistry;
use crate::store::EmployeeStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EmployeeStore>,
    pub pipeline: IngestPipeline,
    pub runs: RunRegistry,
    pub upload_dir: PathBuf,
    pub log_file: PathBuf,
}

impl AppState {
    /// Wire one store into both the ingestion pipeline and the read routes
    pub fn new<S>(
        store: Arc<S>,
        pipeline: PipelineConfig,
        upload_dir: impl Into<PathBuf>,
        log_file: impl Into<PathBuf>,
    ) -> Result<Self, IngestError>
    where
        S: EmployeeStore + 'static,
    {
        let pipeline = IngestPipeline::new(pipeline, store.clone())?;

        Ok(Self {
            store,
            pipeline,
            runs: RunRegistry::new(),
            upload_dir: upload_dir.into(),
            log_file: log_file.into(),
        })
    }

    /// Bound how many finished runs `/runs` remembers
    pub fn with_retained_runs(mut self, retained: usize) -> Self {
        self.runs = RunRegistry::with_retention(retained);
        self
    }
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/upload", post(upload::upload_file))
        .route("/runs", get(runs::list_runs))
        .route("/runs/:run_id", get(runs::get_run))
        .route("/records", get(records::list_records))
        .route("/count", get(records::count_records))
        .route("/logs", get(logs::analyze_logs))
        .with_state(state)
        // Apply layers from innermost to outermost
        .layer(DefaultBodyLimit::max(config.body_limit()))
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to the Roster API",
        "version": env!("CARGO_PKG_VERSION"),
        "routes": {
            "/upload": "POST - Upload a CSV file",
            "/runs/:run_id": "GET - Get the state of an ingestion run",
            "/records": "GET - Get paginated records",
            "/count": "GET - Get total record count",
            "/logs": "GET - Analyze application logs",
            "/health": "GET - Check storage connectivity",
        }
    }))
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "storage": state.store.name(),
                "active_runs": state.runs.active().await,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Storage health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "storage": state.store.name(),
                })),
            )
        },
    }
}
