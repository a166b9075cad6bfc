//! Metadata Store Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database transaction failed: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("Failed to save codebase metadata: {0}")]
    InsertBatch(#[source] sqlx::Error),

    #[error("Failed to save file metadata for {path}: {source}")]
    InsertFile {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("Too many files in a single upload ({0})")]
    TooManyFiles(usize),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
