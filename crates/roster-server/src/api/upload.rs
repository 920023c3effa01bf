//! CSV upload
//!
//! The `file` field is streamed to disk chunk by chunk, then an ingestion run
//! is started on the saved file. The response does not wait for the run.

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::error::AppError;

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub run_id: Uuid,
}

/// `POST /upload` (multipart, field `file`)
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let file_name = sanitize_file_name(&original_name).ok_or_else(|| {
            AppError::BadRequest(format!("Invalid file name: {:?}", original_name))
        })?;
        info!(file = %file_name, "Received file");

        tokio::fs::create_dir_all(&state.upload_dir).await?;

        // Unique prefix so concurrent uploads of the same name never share a file
        let path = state
            .upload_dir
            .join(format!("{}-{}", Uuid::new_v4().simple(), file_name));

        let bytes = match save_field(field, &path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to save uploaded file");
                remove_quietly(&path).await;
                return Err(e);
            },
        };
        info!(path = %path.display(), bytes, "File uploaded successfully");

        let handle = match state.pipeline.start(&path).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Uploaded file rejected");
                remove_quietly(&path).await;
                return Err(e.into());
            },
        };
        let run_id = state.runs.register(file_name, handle).await;

        return Ok((
            StatusCode::ACCEPTED,
            Json(UploadResponse {
                message: "File uploaded successfully, processing started".to_string(),
                run_id,
            }),
        ));
    }

    Err(AppError::BadRequest(format!(
        "Multipart field '{}' is required",
        FILE_FIELD
    )))
}

async fn save_field(mut field: Field<'_>, path: &Path) -> Result<u64, AppError> {
    let file = tokio::fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);
    let mut bytes = 0u64;

    while let Some(chunk) = field.chunk().await? {
        writer.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    writer.flush().await?;

    Ok(bytes)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove uploaded file");
    }
}

/// Reduce a client-supplied name to its final path component.
///
/// Both `/` and `\` count as separators. Returns `None` when nothing usable
/// is left.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();

    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return None;
    }

    Some(last.to_string())
}
