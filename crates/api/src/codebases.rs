use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use codeshelf_core::{Batch, BatchId, BatchIdError, FileRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CodebaseListResponse {
    pub success: bool,
    pub codebases: Vec<Batch>,
}

#[derive(Debug, Serialize)]
pub struct CodebaseFilesResponse {
    pub success: bool,
    pub directory_id: BatchId,
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Serialize)]
pub struct FileMetadataResponse {
    pub success: bool,
    pub file: FileRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileQuery {
    pub file: Option<String>,
}

impl FileQuery {
    /// The `file` parameter, required and non-empty
    pub fn required_path(self) -> Result<String, ApiError> {
        self.file
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::BadRequest("File path is required".to_string()))
    }
}

/// The required `file` parameter; a query string that fails to deserialize
/// (for example a repeated `file`) is a bad request like any other
pub fn required_file(query: Result<Query<FileQuery>, QueryRejection>) -> Result<String, ApiError> {
    let Query(query) = query.map_err(|e| {
        tracing::debug!("Rejected query string: {}", e);
        ApiError::BadRequest("Invalid query parameters".to_string())
    })?;
    query.required_path()
}

/// Parse a client-supplied batch id before it reaches the store or backend
pub fn parse_batch_id(raw: &str) -> Result<BatchId, ApiError> {
    raw.parse::<BatchId>().map_err(|e| {
        tracing::debug!(directory_id = %raw, "Rejected malformed directory ID");
        ApiError::from(e)
    })
}

/// Batch id from the `{id}` path segment; undecodable segments count as malformed ids
pub fn batch_id_from_path(id: Result<Path<String>, PathRejection>) -> Result<BatchId, ApiError> {
    let Path(id) = id.map_err(|e| {
        tracing::debug!("Rejected path: {}", e);
        ApiError::from(BatchIdError::Malformed)
    })?;
    parse_batch_id(&id)
}

/// Fail with 404 unless the batch is recorded
pub async fn require_batch(state: &AppState, batch_id: &BatchId) -> Result<(), ApiError> {
    if state.metadata.batch_exists(batch_id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound("Codebase not found".to_string()))
    }
}

/// GET /codebases
pub async fn list_codebases(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CodebaseListResponse>, ApiError> {
    let codebases = state.metadata.list_batches().await?;
    Ok(Json(CodebaseListResponse {
        success: true,
        codebases,
    }))
}

/// GET /codebases/{id}
pub async fn get_codebase_files(
    State(state): State<Arc<AppState>>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<CodebaseFilesResponse>, ApiError> {
    let batch_id = batch_id_from_path(id)?;
    require_batch(&state, &batch_id).await?;

    let files = state.metadata.list_files(&batch_id).await?;
    Ok(Json(CodebaseFilesResponse {
        success: true,
        directory_id: batch_id,
        files,
    }))
}

/// GET /codebases/{id}/metadata?file=<path>
pub async fn get_file_metadata(
    State(state): State<Arc<AppState>>,
    id: Result<Path<String>, PathRejection>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> Result<Json<FileMetadataResponse>, ApiError> {
    let batch_id = batch_id_from_path(id)?;
    let path = required_file(query)?;

    let file = state
        .metadata
        .file_record(&batch_id, &path)
        .await?
        .ok_or_else(|| ApiError::NotFound("File not found in codebase".to_string()))?;

    Ok(Json(FileMetadataResponse {
        success: true,
        file,
    }))
}
