use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use crate::batch_id::BatchId;

/// One upload batch ("codebase")
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Batch {
    #[serde(rename = "directory_id")]
    pub id: BatchId,
    pub created_at: DateTime<Utc>,
    pub file_count: i32,
}

impl<'r> FromRow<'r, PgRow> for Batch {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        Ok(Self {
            id: BatchId::from(id),
            created_at: row.try_get("created_at")?,
            file_count: row.try_get("file_count")?,
        })
    }
}

/// Metadata for one file inside a batch.
///
/// `size` is the number of bytes actually forwarded to the storage backend,
/// never the size a client claimed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    pub size: i64,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, size: i64) -> Self {
        let path = path.into();
        let name = display_name(&path).to_string();
        Self { path, name, size }
    }
}

impl<'r> FromRow<'r, PgRow> for FileRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            path: row.try_get("file_path")?,
            name: row.try_get("file_name")?,
            size: row.try_get("file_size")?,
        })
    }
}

/// Basename of a relative path, accepting both `/` and `\` separators
pub fn display_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    let name = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    if name.is_empty() {
        path
    } else {
        name
    }
}
