use async_trait::async_trait;
use bytes::Bytes;
use codeshelf_core::BatchId;
use futures::{Stream, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use std::pin::Pin;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::error::StorageError;
use crate::relay::RelayPayload;

/// A pinned, boxed stream of bytes for streaming proxy responses
pub type StorageByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Read endpoints exposed by the storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// `GET /content/{id}?file=` - JSON payload with the file's content
    Content,
    /// `GET /download/{id}?file=` - raw file bytes
    Download,
    /// `GET /zip/{id}` - zip of the whole batch
    Zip,
}

impl FetchKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            FetchKind::Content => "content",
            FetchKind::Download => "download",
            FetchKind::Zip => "zip",
        }
    }
}

/// Response from a read endpoint, body not yet consumed
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: StorageByteStream,
}

impl std::fmt::Debug for BackendResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Send one upload's files in a single `/store` request.
    /// Any transport failure or non-2xx status is an error.
    async fn store(&self, payload: RelayPayload) -> Result<(), StorageError>;

    /// Call a read endpoint. Non-2xx statuses are returned, not turned into errors.
    async fn fetch(
        &self,
        kind: FetchKind,
        batch_id: &BatchId,
        path: Option<&str>,
    ) -> Result<BackendResponse, StorageError>;
}

/// HTTP client for the storage backend
#[derive(Clone)]
pub struct HttpStorageBackend {
    client: Client,
    base_url: Url,
}

impl HttpStorageBackend {
    /// Every request made by this client is bounded by `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// URL of a read endpoint, with the relative path query-escaped into `file`
    pub fn fetch_url(
        &self,
        kind: FetchKind,
        batch_id: &BatchId,
        path: Option<&str>,
    ) -> Result<Url, StorageError> {
        let id = batch_id.to_string();
        let mut url = self.endpoint_url(&[kind.endpoint(), id.as_str()])?;
        if let Some(path) = path {
            url.query_pairs_mut().append_pair("file", path);
        }
        Ok(url)
    }
}

fn build_form(payload: RelayPayload) -> Form {
    let mut form = Form::new().text("codebase_id", payload.batch_id.to_string());
    for part in payload.parts {
        let body = Body::wrap_stream(ReaderStream::new(part.file));
        let file_part = Part::stream_with_length(body, part.size).file_name(part.file_name.clone());
        form = form
            .part("files", file_part)
            .text(format!("path_{}", part.file_name), part.path);
    }
    form
}

#[async_trait]
impl StorageBackend for HttpStorageBackend {
    async fn store(&self, payload: RelayPayload) -> Result<(), StorageError> {
        let url = self.endpoint_url(&["store"])?;
        let batch_id = payload.batch_id;
        let file_count = payload.parts.len();

        let response = self
            .client
            .post(url)
            .multipart(build_form(payload))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                directory_id = %batch_id,
                status = status.as_u16(),
                body = %body,
                "Storage server rejected upload"
            );
            return Err(StorageError::Status(status));
        }

        tracing::debug!(directory_id = %batch_id, files = file_count, "Storage server accepted upload");
        Ok(())
    }

    async fn fetch(
        &self,
        kind: FetchKind,
        batch_id: &BatchId,
        path: Option<&str>,
    ) -> Result<BackendResponse, StorageError> {
        let url = self.fetch_url(kind, batch_id, path)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(std::io::Error::other);

        Ok(BackendResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
