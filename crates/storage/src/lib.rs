//! Codeshelf Storage
//!
//! Everything that talks to the storage backend ("Server B"):
//! - the relay that re-packages uploaded files into one outbound multipart request
//! - the backend client used by the upload and read paths

pub mod backend;
pub mod error;
pub mod relay;

pub use backend::{BackendResponse, FetchKind, HttpStorageBackend, StorageBackend, StorageByteStream};
pub use error::StorageError;
pub use relay::{prepare_relay, IncomingFile, PathOverrides, PreparedRelay, RelayPart, RelayPayload, ResolvedFile, SkippedFile};
