//! Ingestion run status

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::AppState;
use crate::error::AppError;
use crate::runs::RunStatus;

/// `GET /runs`
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunStatus>> {
    Json(state.runs.list().await)
}

/// `GET /runs/:run_id`
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunStatus>, AppError> {
    state
        .runs
        .status(run_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))
}
