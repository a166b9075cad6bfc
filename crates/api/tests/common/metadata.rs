//! In-memory metadata store with failure injection.

use async_trait::async_trait;
use chrono::Utc;
use codeshelf_core::{Batch, BatchId, FileRecord, MetadataError, MetadataStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    /// Newest last
    batches: Vec<Batch>,
    files: HashMap<BatchId, Vec<FileRecord>>,
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `record_upload` fail as if a file insert was rejected
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every read (and the readiness ping) fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of trait calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_count(&self) -> usize {
        self.tables.lock().unwrap().batches.len()
    }

    pub fn file_count(&self) -> usize {
        self.tables.lock().unwrap().files.values().map(Vec::len).sum()
    }

    fn enter_read(&self) -> Result<(), MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MetadataError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn record_upload(
        &self,
        batch_id: &BatchId,
        files: &[FileRecord],
    ) -> Result<Batch, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MetadataError::InsertFile {
                path: files.first().map(|f| f.path.clone()).unwrap_or_default(),
                source: sqlx::Error::PoolTimedOut,
            });
        }

        let batch = Batch {
            id: *batch_id,
            created_at: Utc::now(),
            file_count: files.len() as i32,
        };
        let mut tables = self.tables.lock().unwrap();
        tables.batches.push(batch.clone());
        tables.files.insert(*batch_id, files.to_vec());
        Ok(batch)
    }

    async fn list_batches(&self) -> Result<Vec<Batch>, MetadataError> {
        self.enter_read()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.batches.iter().rev().cloned().collect())
    }

    async fn list_files(&self, batch_id: &BatchId) -> Result<Vec<FileRecord>, MetadataError> {
        self.enter_read()?;
        let tables = self.tables.lock().unwrap();
        let mut files = tables.files.get(batch_id).cloned().unwrap_or_default();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn batch_exists(&self, batch_id: &BatchId) -> Result<bool, MetadataError> {
        self.enter_read()?;
        Ok(self.tables.lock().unwrap().files.contains_key(batch_id))
    }

    async fn file_record(
        &self,
        batch_id: &BatchId,
        path: &str,
    ) -> Result<Option<FileRecord>, MetadataError> {
        self.enter_read()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .files
            .get(batch_id)
            .and_then(|files| files.iter().find(|f| f.path == path).cloned()))
    }

    async fn ping(&self) -> Result<(), MetadataError> {
        self.enter_read()
    }
}
