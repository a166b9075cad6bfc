//! Upload Orchestrator
//!
//! Validate, generate a batch id, relay every file to the storage backend,
//! then commit all metadata in one transaction. Metadata is only written
//! after the backend has accepted the bytes, so no file record can point at
//! content that failed to store.
//!
//! The reverse is not guaranteed: when the commit fails after a successful
//! relay, the backend keeps bytes under a batch id that is never recorded.
//! The backend offers no delete endpoint, so those orphans are only logged.

use codeshelf_core::{Batch, BatchId, FileRecord, MetadataStore};
use codeshelf_storage::{prepare_relay, IncomingFile, PathOverrides, ResolvedFile, SkippedFile, StorageBackend};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub batch: Batch,
    /// Records committed for this batch, in request order
    pub files: Vec<FileRecord>,
    pub skipped: Vec<SkippedFile>,
    pub total_size: i64,
}

pub struct UploadOrchestrator {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn StorageBackend>,
    strict: bool,
}

impl UploadOrchestrator {
    pub fn new(metadata: Arc<dyn MetadataStore>, storage: Arc<dyn StorageBackend>, strict: bool) -> Self {
        Self {
            metadata,
            storage,
            strict,
        }
    }

    pub async fn upload(
        &self,
        files: Vec<IncomingFile>,
        overrides: PathOverrides,
    ) -> Result<UploadOutcome, ApiError> {
        if files.is_empty() {
            return Err(ApiError::BadRequest("No files uploaded".to_string()));
        }

        let resolved = overrides.resolve_all(files);
        if let Some(path) = first_duplicate_path(&resolved) {
            return Err(ApiError::BadRequest(format!(
                "Duplicate file path in upload: {}",
                path
            )));
        }

        let batch_id = BatchId::generate();
        let prepared = prepare_relay(batch_id, resolved).await;

        if !prepared.skipped.is_empty() && self.strict {
            return Err(ApiError::Internal(format!(
                "Failed to read {} uploaded file(s)",
                prepared.skipped.len()
            )));
        }
        if prepared.files.is_empty() {
            return Err(ApiError::Internal(
                "None of the uploaded files could be read".to_string(),
            ));
        }

        let total_size = prepared.total_size();
        let files = prepared.files;
        let skipped = prepared.skipped;

        tracing::info!(
            directory_id = %batch_id,
            files = files.len(),
            skipped = skipped.len(),
            bytes = total_size,
            "Relaying upload to storage server"
        );

        if let Err(e) = self.storage.store(prepared.payload).await {
            tracing::error!(directory_id = %batch_id, error = %e, "Relay to storage server failed");
            return Err(ApiError::Internal("Failed to store files".to_string()));
        }

        let batch = match self.metadata.record_upload(&batch_id, &files).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(
                    directory_id = %batch_id,
                    error = %e,
                    "Metadata commit failed after relay; stored files are orphaned on the storage server"
                );
                return Err(e.into());
            }
        };

        tracing::info!(directory_id = %batch_id, files = files.len(), bytes = total_size, "Upload committed");

        Ok(UploadOutcome {
            batch,
            files,
            skipped,
            total_size,
        })
    }
}

fn first_duplicate_path(files: &[ResolvedFile]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(files.len());
    files
        .iter()
        .map(|f| f.path.as_str())
        .find(|path| !seen.insert(*path))
}
