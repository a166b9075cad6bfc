//! In-process stand-in for the storage backend ("Server B").
//!
//! Speaks the same `/store`, `/content`, `/download` and `/zip` contract over
//! real HTTP on a loopback port.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use codeshelf_storage::PathOverrides;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Response header the gateway must never forward
pub const INTERNAL_HEADER: &str = "x-internal-node";

#[derive(Default)]
struct BackendState {
    /// (batch id, relative path) -> bytes
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    fail_store: AtomicBool,
    fail_reads: AtomicBool,
    requests: AtomicUsize,
}

pub struct FakeStorageServer {
    addr: SocketAddr,
    state: Arc<BackendState>,
    _handle: tokio::task::JoinHandle<()>,
}

#[derive(Deserialize)]
struct FileQuery {
    file: Option<String>,
}

#[allow(dead_code)]
impl FakeStorageServer {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        let app = Router::new()
            .route("/store", post(store))
            .route("/content/{id}", get(content))
            .route("/download/{id}", get(download))
            .route("/zip/{id}", get(zip))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake storage server");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake storage server failed");
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer `/store` with 500 after draining the body
    pub fn fail_store(&self, fail: bool) {
        self.state.fail_store.store(fail, Ordering::SeqCst);
    }

    /// Answer every read endpoint with 500
    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn stored(&self, batch_id: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .files
            .lock()
            .unwrap()
            .get(&(batch_id.to_string(), path.to_string()))
            .cloned()
    }

    pub fn stored_count(&self) -> usize {
        self.state.files.lock().unwrap().len()
    }

    /// Drop a stored file while leaving the gateway's metadata untouched
    pub fn forget(&self, batch_id: &str, path: &str) {
        self.state
            .files
            .lock()
            .unwrap()
            .remove(&(batch_id.to_string(), path.to_string()));
    }
}

async fn store(State(state): State<Arc<BackendState>>, mut multipart: Multipart) -> StatusCode {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let mut batch_id = None;
    let mut parts = Vec::new();
    let mut overrides = PathOverrides::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "codebase_id" {
            batch_id = field.text().await.ok();
        } else if name == "files" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            match field.bytes().await {
                Ok(data) => parts.push((file_name, data.to_vec())),
                Err(_) => return StatusCode::BAD_REQUEST,
            }
        } else if let Some(target) = name.strip_prefix("path_") {
            let target = target.to_string();
            if let Ok(value) = field.text().await {
                overrides.push(target, value);
            }
        }
    }

    if state.fail_store.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    let Some(batch_id) = batch_id else {
        return StatusCode::BAD_REQUEST;
    };

    let mut files = state.files.lock().unwrap();
    for (file_name, data) in parts {
        let path = overrides.resolve(&file_name);
        files.insert((batch_id.clone(), path), data);
    }
    StatusCode::OK
}

fn lookup(state: &BackendState, id: &str, query: &FileQuery) -> Result<Vec<u8>, StatusCode> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_reads.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let path = query.file.clone().ok_or(StatusCode::BAD_REQUEST)?;
    state
        .files
        .lock()
        .unwrap()
        .get(&(id.to_string(), path))
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn content(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Response {
    match lookup(&state, &id, &query) {
        Ok(data) => {
            let mut response = Json(serde_json::json!({
                "success": true,
                "content": String::from_utf8_lossy(&data),
            }))
            .into_response();
            // The gateway relabels content responses as JSON
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            response
        }
        Err(status) => status.into_response(),
    }
}

async fn download(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Response {
    match lookup(&state, &id, &query) {
        Ok(data) => (
            [
                (header::CONTENT_TYPE, "text/plain"),
                (header::HeaderName::from_static(INTERNAL_HEADER), "b-1"),
                (header::SET_COOKIE, "node=b-1"),
            ],
            data,
        )
            .into_response(),
        Err(status) => status.into_response(),
    }
}

async fn zip(State(state): State<Arc<BackendState>>, Path(id): Path<String>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_reads.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let files = state.files.lock().unwrap();
    let mut entries: Vec<_> = files.keys().filter(|(batch, _)| *batch == id).collect();
    if entries.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    entries.sort();

    // Not a real archive; a listing is enough to prove the bytes came through
    let listing = entries
        .iter()
        .map(|(_, path)| path.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Response::new(Body::from(listing))
}
