//! Storage Relay
//!
//! Turns the file parts of one upload into a single outbound payload for the
//! storage backend. File contents stay in their spool files and are streamed
//! into the outbound request; nothing is buffered whole in memory.
//!
//! Sizes are the byte counts taken while spooling, so a record's size is
//! accurate even when the client-declared size is not. A spool file that
//! cannot be opened, or whose length no longer matches that count, is skipped
//! and reported in [`PreparedRelay::skipped`]; it never fails the relay as a
//! whole.

use codeshelf_core::{BatchId, FileRecord};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tokio::fs::File;

/// A file part received from the client and spooled to local disk
#[derive(Debug, Clone)]
pub struct IncomingFile {
    /// Filename declared by the client in the multipart header
    pub file_name: String,
    pub spool_path: PathBuf,
    /// Bytes received from the client and written to `spool_path`
    pub size: u64,
}

/// An incoming file with its relative path decided
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub file_name: String,
    pub path: String,
    pub spool_path: PathBuf,
    pub size: u64,
}

/// Caller-supplied `path_<filename>` overrides.
///
/// Values for the same filename are consumed in order: the N-th override
/// applies to the N-th file part carrying that filename.
#[derive(Debug, Default, Clone)]
pub struct PathOverrides {
    by_name: HashMap<String, VecDeque<String>>,
}

impl PathOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file_name: impl Into<String>, path: impl Into<String>) {
        self.by_name
            .entry(file_name.into())
            .or_default()
            .push_back(path.into());
    }

    /// Next override for `file_name`, or the filename itself when none (or an empty one) remains
    pub fn resolve(&mut self, file_name: &str) -> String {
        match self.by_name.get_mut(file_name).and_then(|queue| queue.pop_front()) {
            Some(path) if !path.trim().is_empty() => path,
            _ => file_name.to_string(),
        }
    }

    pub fn resolve_all(mut self, files: Vec<IncomingFile>) -> Vec<ResolvedFile> {
        files
            .into_iter()
            .map(|file| ResolvedFile {
                path: self.resolve(&file.file_name),
                file_name: file.file_name,
                spool_path: file.spool_path,
                size: file.size,
            })
            .collect()
    }
}

/// One file as it will be sent to the backend, still on disk
#[derive(Debug)]
pub struct RelayPart {
    pub file_name: String,
    pub path: String,
    pub file: File,
    pub size: u64,
}

/// The complete outbound `/store` request body
#[derive(Debug)]
pub struct RelayPayload {
    pub batch_id: BatchId,
    pub parts: Vec<RelayPart>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub file_name: String,
    pub path: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct PreparedRelay {
    pub payload: RelayPayload,
    /// What was actually placed in the payload, in request order
    pub files: Vec<FileRecord>,
    pub skipped: Vec<SkippedFile>,
}

impl PreparedRelay {
    pub fn total_size(&self) -> i64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Open every resolved spool file for the payload, skipping the ones that fail
pub async fn prepare_relay(batch_id: BatchId, files: Vec<ResolvedFile>) -> PreparedRelay {
    let mut parts = Vec::with_capacity(files.len());
    let mut records = Vec::with_capacity(files.len());
    let mut skipped = Vec::new();

    for file in files {
        match open_spooled(&file).await {
            Ok((handle, size)) => {
                records.push(FileRecord::new(file.path.clone(), size));
                parts.push(RelayPart {
                    file_name: file.file_name,
                    path: file.path,
                    file: handle,
                    size: file.size,
                });
            }
            Err(e) => {
                tracing::warn!(
                    directory_id = %batch_id,
                    file = %file.file_name,
                    error = %e,
                    "Skipping file that could not be opened for relay"
                );
                skipped.push(SkippedFile {
                    file_name: file.file_name,
                    path: file.path,
                    reason: e.to_string(),
                });
            }
        }
    }

    PreparedRelay {
        payload: RelayPayload { batch_id, parts },
        files: records,
        skipped,
    }
}

async fn open_spooled(file: &ResolvedFile) -> std::io::Result<(File, i64)> {
    let handle = File::open(&file.spool_path).await?;
    let on_disk = handle.metadata().await?.len();
    if on_disk != file.size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("spooled {} bytes but received {}", on_disk, file.size),
        ));
    }
    let size = i64::try_from(file.size)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "file too large"))?;
    Ok((handle, size))
}
