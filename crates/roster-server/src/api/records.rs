//! Read endpoints over stored employees

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::error::AppError;
use crate::store::{PageRequest, SortColumn, SortOrder, StoredEmployee};

#[derive(Debug, Deserialize, Default)]
pub struct RecordsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl RecordsQuery {
    pub fn to_page_request(&self) -> PageRequest {
        PageRequest::new(
            self.page,
            self.limit,
            self.sort.as_deref().map(SortColumn::from_param).unwrap_or_default(),
            self.order.as_deref().map(SortOrder::from_param).unwrap_or_default(),
        )
    }
}

/// `GET /records?page&limit&sort&order`
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<Vec<StoredEmployee>>, AppError> {
    let request = query.to_page_request();
    if query.sort.as_deref().is_some_and(|s| s.parse::<SortColumn>().is_err()) {
        tracing::debug!(sort = ?query.sort, "Unknown sort column, ordering by id");
    }

    let records = state.store.page(&request).await?;
    Ok(Json(records))
}

/// `GET /count`
pub async fn count_records(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let total = state.store.count().await?;
    Ok(Json(json!({ "total_rows": total })))
}
