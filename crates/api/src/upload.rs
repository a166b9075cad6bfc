use axum::{
    extract::{multipart::MultipartError, multipart::MultipartRejection, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use codeshelf_core::BatchId;
use codeshelf_storage::{IncomingFile, PathOverrides};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::error::ApiError;
use crate::AppState;

const FILES_FIELD: &str = "files";
const PATH_FIELD_PREFIX: &str = "path_";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub directory_id: BatchId,
    pub uploaded_files: Vec<String>,
    pub total_size: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
}

struct UploadForm {
    files: Vec<IncomingFile>,
    overrides: PathOverrides,
}

/// POST /upload
///
/// Multipart form: repeated `files` parts plus optional `path_<filename>`
/// fields overriding each file's relative path.
pub async fn upload_codebase(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    if let Some(len) = content_length(&headers) {
        if len > state.max_upload_bytes as u64 {
            return Err(too_large(state.max_upload_bytes));
        }
    }

    let multipart = multipart.map_err(|e| {
        tracing::debug!("Rejected upload body: {}", e);
        ApiError::BadRequest("File too large or invalid form data".to_string())
    })?;

    // Spooled parts live only as long as this request
    let spool = tempfile::Builder::new()
        .prefix("codeshelf_upload_")
        .tempdir()
        .map_err(|e| {
            tracing::error!("Failed to create spool directory: {:?}", e);
            ApiError::Internal("Failed to process upload".to_string())
        })?;

    let form = read_upload_form(multipart, spool.path(), state.max_upload_bytes).await?;

    let outcome = state.orchestrator().upload(form.files, form.overrides).await?;

    let file_count = outcome.files.len();
    Ok(Json(UploadResponse {
        success: true,
        message: format!(
            "Successfully uploaded {} files ({} bytes total)",
            file_count, outcome.total_size
        ),
        directory_id: outcome.batch.id,
        uploaded_files: outcome.files.into_iter().map(|f| f.path).collect(),
        total_size: outcome.total_size,
        skipped_files: outcome.skipped.into_iter().map(|f| f.path).collect(),
    }))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn too_large(limit: usize) -> ApiError {
    ApiError::PayloadTooLarge(format!("Upload exceeds the maximum size of {} bytes", limit))
}

fn form_error(e: MultipartError, limit: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(limit)
    } else {
        tracing::debug!("Malformed multipart upload: {}", e);
        ApiError::BadRequest("File too large or invalid form data".to_string())
    }
}

async fn read_upload_form(
    mut multipart: Multipart,
    spool_dir: &Path,
    limit: usize,
) -> Result<UploadForm, ApiError> {
    let mut files = Vec::new();
    let mut overrides = PathOverrides::new();

    while let Some(mut field) = multipart.next_field().await.map_err(|e| form_error(e, limit))? {
        let name = field.name().unwrap_or_default().to_string();

        if name == FILES_FIELD {
            let file_name = field
                .file_name()
                .filter(|n| !n.is_empty())
                .unwrap_or("unnamed")
                .to_string();
            let spool_path = spool_dir.join(format!("part-{:05}", files.len()));

            // A local spool failure only loses this file: the part is still
            // drained, and the missing spool file is skipped by the relay.
            let mut spool_file = match tokio::fs::File::create(&spool_path).await {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(file = %file_name, error = %e, "Failed to create spool file");
                    None
                }
            };

            let mut received: u64 = 0;
            while let Some(chunk) = field.chunk().await.map_err(|e| form_error(e, limit))? {
                received += chunk.len() as u64;
                if let Some(f) = spool_file.as_mut() {
                    if let Err(e) = f.write_all(&chunk).await {
                        tracing::warn!(file = %file_name, error = %e, "Failed to write spool file");
                        spool_file = None;
                        let _ = tokio::fs::remove_file(&spool_path).await;
                    }
                }
            }

            if let Some(mut f) = spool_file {
                if let Err(e) = f.flush().await {
                    tracing::warn!(file = %file_name, error = %e, "Failed to flush spool file");
                    let _ = tokio::fs::remove_file(&spool_path).await;
                }
            }

            files.push(IncomingFile {
                file_name,
                spool_path,
                size: received,
            });
        } else if let Some(target) = name.strip_prefix(PATH_FIELD_PREFIX) {
            let value = field.text().await.map_err(|e| form_error(e, limit))?;
            overrides.push(target, value);
        }
    }

    Ok(UploadForm { files, overrides })
}
