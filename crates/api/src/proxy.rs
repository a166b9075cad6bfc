//! Read-Path Proxy
//!
//! Content, download and zip requests are checked against the metadata store
//! first, then streamed from the storage backend. Only an allow-list of
//! backend response headers is passed through.

use axum::{
    body::Body,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use codeshelf_core::BatchId;
use codeshelf_storage::{BackendResponse, FetchKind};
use std::sync::Arc;

use crate::codebases::{batch_id_from_path, require_batch, required_file, FileQuery};
use crate::error::ApiError;
use crate::AppState;

/// Backend response headers forwarded to the client
const FORWARDED_HEADERS: [HeaderName; 7] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_DISPOSITION,
    header::CONTENT_ENCODING,
    header::ETAG,
    header::LAST_MODIFIED,
    header::CACHE_CONTROL,
];

/// GET /codebases/{id}/content?file=<path>
pub async fn read_file_content(
    State(state): State<Arc<AppState>>,
    id: Result<Path<String>, PathRejection>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let batch_id = batch_id_from_path(id)?;
    let path = required_file(query)?;
    require_file(&state, &batch_id, &path).await?;

    tracing::info!(directory_id = %batch_id, file = %path, "Fetching file content");
    let upstream = fetch(&state, FetchKind::Content, &batch_id, Some(&path)).await?;

    let mut response = stream_through(upstream);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// GET /codebases/{id}/download?file=<path>
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    id: Result<Path<String>, PathRejection>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let batch_id = batch_id_from_path(id)?;
    let path = required_file(query)?;
    let file_name = require_file(&state, &batch_id, &path).await?;

    let upstream = fetch(&state, FetchKind::Download, &batch_id, Some(&path)).await?;

    let mut response = stream_through(upstream);
    let headers = response.headers_mut();
    set_if_absent(
        headers,
        header::CONTENT_DISPOSITION,
        &sanitize_content_disposition(&file_name, "attachment"),
    );
    set_if_absent(headers, header::CONTENT_TYPE, "application/octet-stream");
    Ok(response)
}

/// GET /codebases/{id}/zip
pub async fn download_zip(
    State(state): State<Arc<AppState>>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let batch_id = batch_id_from_path(id)?;
    require_batch(&state, &batch_id).await?;

    let upstream = fetch(&state, FetchKind::Zip, &batch_id, None).await?;

    let mut response = stream_through(upstream);
    let headers = response.headers_mut();
    set_if_absent(headers, header::CONTENT_TYPE, "application/zip");
    set_if_absent(
        headers,
        header::CONTENT_DISPOSITION,
        &sanitize_content_disposition(&format!("codebase-{}.zip", batch_id), "attachment"),
    );
    Ok(response)
}

/// Fail with 404 unless the file is recorded; returns its display name
async fn require_file(state: &AppState, batch_id: &BatchId, path: &str) -> Result<String, ApiError> {
    state
        .metadata
        .file_name(batch_id, path)
        .await?
        .ok_or_else(|| ApiError::NotFound("File not found in codebase".to_string()))
}

/// Call the backend and map its status: 200 passes through, 404 is not-found, anything else is internal
async fn fetch(
    state: &AppState,
    kind: FetchKind,
    batch_id: &BatchId,
    path: Option<&str>,
) -> Result<BackendResponse, ApiError> {
    let upstream = state
        .storage
        .fetch(kind, batch_id, path)
        .await
        .map_err(|e| {
            tracing::error!(directory_id = %batch_id, endpoint = kind.endpoint(), error = %e, "Storage server request failed");
            ApiError::Internal("Storage server unavailable".to_string())
        })?;

    match upstream.status {
        StatusCode::OK => Ok(upstream),
        StatusCode::NOT_FOUND => {
            tracing::warn!(directory_id = %batch_id, file = ?path, "Storage server has no such file");
            Err(ApiError::NotFound(match kind {
                FetchKind::Zip => "Codebase not found in storage".to_string(),
                _ => "File not found in storage".to_string(),
            }))
        }
        status => {
            tracing::error!(
                directory_id = %batch_id,
                endpoint = kind.endpoint(),
                status = status.as_u16(),
                "Storage server returned an error"
            );
            Err(ApiError::Internal(
                "Failed to retrieve file from storage".to_string(),
            ))
        }
    }
}

fn stream_through(upstream: BackendResponse) -> Response {
    let mut headers = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        for value in upstream.headers.get_all(&name) {
            headers.append(name.clone(), value.clone());
        }
    }

    (StatusCode::OK, headers, Body::from_stream(upstream.body)).into_response()
}

fn set_if_absent(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if headers.contains_key(&name) {
        return;
    }
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(e) => tracing::warn!(header = %name, error = %e, "Skipping invalid header value"),
    }
}

/// Build a Content-Disposition value that cannot break out of the header
fn sanitize_content_disposition(filename: &str, disposition: &str) -> String {
    let sanitized = sanitize_filename(filename);
    let is_ascii = sanitized.chars().all(|c| c.is_ascii() && c != '"');

    if sanitized.is_empty() {
        return format!("{}; filename=\"download\"", disposition);
    }
    if is_ascii {
        return format!("{}; filename=\"{}\"", disposition, sanitized);
    }

    // RFC 5987: ASCII fallback plus UTF-8 percent-encoded filename*
    let encoded: String = sanitized
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "-_.~".contains(c) {
                c.to_string()
            } else {
                c.encode_utf8(&mut [0; 4])
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect();
    let fallback: String = sanitized
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "-_.".contains(*c))
        .collect();
    let fallback = if fallback.is_empty() { "download".to_string() } else { fallback };

    format!("{}; filename=\"{}\"; filename*=UTF-8''{}", disposition, fallback, encoded)
}

fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
