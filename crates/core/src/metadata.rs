//! Metadata Store
//!
//! Transactional persistence of codebase (batch) records and their file
//! records. An upload's batch row and all of its file rows are written in a
//! single transaction, so readers never observe a batch without its files.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::batch_id::BatchId;
use crate::error::MetadataError;
use crate::models::{Batch, FileRecord};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Atomically create the batch and one record per file.
    /// Either everything is committed or nothing is visible.
    async fn record_upload(
        &self,
        batch_id: &BatchId,
        files: &[FileRecord],
    ) -> Result<Batch, MetadataError>;

    /// All batches, newest first
    async fn list_batches(&self) -> Result<Vec<Batch>, MetadataError>;

    /// Files of one batch ordered by path; empty when the batch is unknown
    async fn list_files(&self, batch_id: &BatchId) -> Result<Vec<FileRecord>, MetadataError>;

    async fn batch_exists(&self, batch_id: &BatchId) -> Result<bool, MetadataError>;

    async fn file_record(
        &self,
        batch_id: &BatchId,
        path: &str,
    ) -> Result<Option<FileRecord>, MetadataError>;

    async fn file_exists(&self, batch_id: &BatchId, path: &str) -> Result<bool, MetadataError> {
        Ok(self.file_record(batch_id, path).await?.is_some())
    }

    async fn file_name(&self, batch_id: &BatchId, path: &str) -> Result<Option<String>, MetadataError> {
        Ok(self.file_record(batch_id, path).await?.map(|f| f.name))
    }

    /// Connectivity check used by the readiness check
    async fn ping(&self) -> Result<(), MetadataError>;
}

/// PostgreSQL-backed metadata store
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply schema migrations from `migrations/`
    pub async fn migrate(&self) -> Result<(), MetadataError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

async fn insert_batch(
    conn: &mut PgConnection,
    batch_id: &BatchId,
    file_count: i32,
) -> Result<Batch, MetadataError> {
    sqlx::query_as::<_, Batch>(
        r#"
        INSERT INTO codebases (id, file_count)
        VALUES ($1, $2)
        RETURNING id, created_at, file_count
        "#,
    )
    .bind(batch_id.as_uuid())
    .bind(file_count)
    .fetch_one(&mut *conn)
    .await
    .map_err(MetadataError::InsertBatch)
}

async fn insert_file_record(
    conn: &mut PgConnection,
    batch_id: &BatchId,
    file: &FileRecord,
) -> Result<(), MetadataError> {
    sqlx::query(
        r#"
        INSERT INTO files (codebase_id, file_path, file_name, file_size)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(batch_id.as_uuid())
    .bind(&file.path)
    .bind(&file.name)
    .bind(file.size)
    .execute(&mut *conn)
    .await
    .map_err(|source| MetadataError::InsertFile {
        path: file.path.clone(),
        source,
    })?;
    Ok(())
}

/// Decode rows one at a time, skipping any that fail to decode
fn decode_rows<T>(rows: Vec<PgRow>, what: &str) -> Vec<T>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    rows.iter()
        .filter_map(|row| match T::from_row(row) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed {} row", what);
                None
            }
        })
        .collect()
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn record_upload(
        &self,
        batch_id: &BatchId,
        files: &[FileRecord],
    ) -> Result<Batch, MetadataError> {
        let file_count =
            i32::try_from(files.len()).map_err(|_| MetadataError::TooManyFiles(files.len()))?;

        let mut tx = self.pool.begin().await.map_err(MetadataError::Begin)?;

        let batch = match insert_batch(&mut tx, batch_id, file_count).await {
            Ok(batch) => batch,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(directory_id = %batch_id, error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };

        for file in files {
            if let Err(e) = insert_file_record(&mut tx, batch_id, file).await {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(directory_id = %batch_id, error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        }

        tx.commit().await.map_err(MetadataError::Commit)?;

        tracing::debug!(directory_id = %batch_id, files = files.len(), "Committed codebase metadata");
        Ok(batch)
    }

    async fn list_batches(&self) -> Result<Vec<Batch>, MetadataError> {
        let rows = sqlx::query("SELECT id, created_at, file_count FROM codebases ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(decode_rows(rows, "codebase"))
    }

    async fn list_files(&self, batch_id: &BatchId) -> Result<Vec<FileRecord>, MetadataError> {
        let rows = sqlx::query(
            "SELECT file_path, file_name, file_size FROM files WHERE codebase_id = $1 ORDER BY file_path",
        )
        .bind(batch_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(decode_rows(rows, "file"))
    }

    async fn batch_exists(&self, batch_id: &BatchId) -> Result<bool, MetadataError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM codebases WHERE id = $1)")
            .bind(batch_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn file_record(
        &self,
        batch_id: &BatchId,
        path: &str,
    ) -> Result<Option<FileRecord>, MetadataError> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT file_path, file_name, file_size FROM files WHERE codebase_id = $1 AND file_path = $2",
        )
        .bind(batch_id.as_uuid())
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn file_exists(&self, batch_id: &BatchId, path: &str) -> Result<bool, MetadataError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM files WHERE codebase_id = $1 AND file_path = $2)",
        )
        .bind(batch_id.as_uuid())
        .bind(path)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn ping(&self) -> Result<(), MetadataError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
