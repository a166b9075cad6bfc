//! Storage Backend Error Types

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage server unavailable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Storage server returned status {0}")]
    Status(StatusCode),

    #[error("Invalid storage server URL: {0}")]
    InvalidUrl(String),
}

impl From<url::ParseError> for StorageError {
    fn from(e: url::ParseError) -> Self {
        StorageError::InvalidUrl(e.to_string())
    }
}
