//! Gateway under test, wired to the in-memory store and the fake backend.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use codeshelf_api::{apply_middleware, create_router, AppState, UploadOrchestrator};
use codeshelf_core::GatewayConfig;
use codeshelf_storage::HttpStorageBackend;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use super::fixtures::MultipartBody;
use super::metadata::MemoryMetadataStore;
use super::storage::FakeStorageServer;

pub struct TestServer {
    pub router: Router,
    pub metadata: Arc<MemoryMetadataStore>,
    pub backend: FakeStorageServer,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(GatewayConfig::default()).await
    }

    pub async fn with_upload_limit(max_upload_bytes: usize) -> Self {
        Self::with_config(GatewayConfig {
            max_upload_bytes,
            ..GatewayConfig::default()
        })
        .await
    }

    pub async fn with_config(config: GatewayConfig) -> Self {
        let backend = FakeStorageServer::start().await;
        let metadata = Arc::new(MemoryMetadataStore::new());
        let router = build_router(&config, metadata.clone(), &backend.base_url());
        Self {
            router,
            metadata,
            backend,
        }
    }

    /// Orchestrator sharing this server's store and backend
    pub fn orchestrator(&self, strict: bool) -> UploadOrchestrator {
        UploadOrchestrator::new(
            self.metadata.clone(),
            Arc::new(storage_client(&self.backend.base_url())),
            strict,
        )
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        into_json(self.get(uri).await).await
    }

    pub async fn upload(&self, form: MultipartBody) -> (StatusCode, Value) {
        into_json(self.send(form.into_request("/upload")).await).await
    }
}

pub fn storage_client(base_url: &str) -> HttpStorageBackend {
    HttpStorageBackend::new(base_url, Duration::from_secs(5)).unwrap()
}

pub fn build_router(
    config: &GatewayConfig,
    metadata: Arc<MemoryMetadataStore>,
    storage_url: &str,
) -> Router {
    let state = Arc::new(AppState {
        metadata,
        storage: Arc::new(storage_client(storage_url)),
        max_upload_bytes: config.max_upload_bytes,
        strict_uploads: config.strict_uploads,
    });
    apply_middleware(create_router(state), config)
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn into_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body_bytes(response).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
