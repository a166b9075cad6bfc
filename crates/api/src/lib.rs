//! Codeshelf API
//!
//! HTTP front-end ("Server A") for multi-file codebase uploads. Files are
//! relayed to the storage backend, metadata is committed to PostgreSQL, and
//! read requests are proxied back to the backend after a local existence check.

pub mod codebases;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod proxy;
pub mod routes;
pub mod upload;

use codeshelf_core::MetadataStore;
use codeshelf_storage::StorageBackend;
use std::sync::Arc;

pub use error::ApiError;
pub use orchestrator::{UploadOrchestrator, UploadOutcome};
pub use routes::{apply_middleware, create_router};

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<dyn MetadataStore>,
    pub storage: Arc<dyn StorageBackend>,
    /// Request-level ceiling for `POST /upload`
    pub max_upload_bytes: usize,
    pub strict_uploads: bool,
}

impl AppState {
    pub fn orchestrator(&self) -> UploadOrchestrator {
        UploadOrchestrator::new(self.metadata.clone(), self.storage.clone(), self.strict_uploads)
    }
}
