//! Server-specific error types

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roster_common::RosterError;
use roster_ingest::IngestError;
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Roster error: {0}")]
    Roster(#[from] RosterError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::BadRequest(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
            AppError::Io(ref e) => {
                tracing::error!("IO error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An IO error occurred".to_string())
            },
            // Carries 413 when the body limit is hit
            AppError::Multipart(ref e) => (e.status(), e.body_text()),
            AppError::Ingest(ref e) => match e {
                IngestError::MissingHeader | IngestError::HeaderRead(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                },
                _ => {
                    tracing::error!("Ingestion error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start ingestion".to_string())
                },
            },
            AppError::Roster(ref e) => match e {
                RosterError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
                RosterError::Parse(message) => (StatusCode::BAD_REQUEST, message.clone()),
                RosterError::Database(_) => {
                    tracing::error!("Database error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred".to_string())
                },
                _ => {
                    tracing::error!("Roster error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                },
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
