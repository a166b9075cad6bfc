//! Codeshelf Core
//!
//! Shared building blocks for the upload gateway:
//! - Batch identifiers and their syntax validation
//! - Codebase / file metadata models
//! - Environment-driven configuration
//! - The transactional metadata store (PostgreSQL)

pub mod batch_id;
pub mod config;
pub mod error;
pub mod metadata;
pub mod models;

pub use batch_id::{BatchId, BatchIdError};
pub use config::GatewayConfig;
pub use error::MetadataError;
pub use metadata::{MetadataStore, PgMetadataStore};
pub use models::{Batch, FileRecord};
