//! API error types.
//!
//! Every failure is rendered as `{"success": false, "error": <message>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use codeshelf_core::{BatchIdError, MetadataError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    InvalidBatchId(#[from] BatchIdError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidBatchId(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) | ApiError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client; database details stay in the logs
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Metadata(e) => match e {
                MetadataError::Begin(_) => "Database transaction failed",
                MetadataError::InsertBatch(_) | MetadataError::TooManyFiles(_) => {
                    "Failed to save codebase metadata"
                }
                MetadataError::InsertFile { .. } => "Failed to save file metadata",
                MetadataError::Commit(_) => "Failed to commit transaction",
                MetadataError::Database(_) | MetadataError::Migration(_) => "Database error",
            }
            .to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}
