//! Blob store collaborator for raw documents and tabular exports.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{DdiError, Result};

/// Storage metadata passed alongside the bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobMetadata {
    pub content_type: Option<String>,
}

impl BlobMetadata {
    pub fn content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

/// What the store reports back after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub size: u64,
}

/// Object storage for raw documents and CSV exports.
pub trait BlobStore {
    fn put(&mut self, bucket: &str, key: &str, data: &[u8], metadata: &BlobMetadata) -> Result<StoredBlob>;
}

/// Timestamp prefix shared by every blob written during one conversion.
pub fn timestamp_label(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// `"<timestamp>/<name>.<ext>"`
pub fn storage_key(timestamp: &str, name: &str, ext: &str) -> String {
    format!("{}/{}.{}", timestamp, name, ext)
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Keeps blobs in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: BTreeMap<(String, String), (Vec<u8>, BlobMetadata)>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<&[u8]> {
        self.blobs
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(data, _)| data.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(|(_, key)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&mut self, bucket: &str, key: &str, data: &[u8], metadata: &BlobMetadata) -> Result<StoredBlob> {
        self.blobs.insert(
            (bucket.to_string(), key.to_string()),
            (data.to_vec(), metadata.clone()),
        );
        Ok(StoredBlob {
            key: key.to_string(),
            size: data.len() as u64,
        })
    }
}

/// Writes blobs below `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        if key.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return Err(DdiError::Blob(format!("Refusing storage key {:?}", key)));
        }
        Ok(self.root.join(bucket).join(key))
    }
}

impl BlobStore for DirBlobStore {
    fn put(&mut self, bucket: &str, key: &str, data: &[u8], _metadata: &BlobMetadata) -> Result<StoredBlob> {
        let path = self.path_for(bucket, key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DdiError::Blob(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        std::fs::write(&path, data)
            .map_err(|e| DdiError::Blob(format!("Cannot write {}: {}", path.display(), e)))?;
        log::debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(StoredBlob {
            key: key.to_string(),
            size: data.len() as u64,
        })
    }
}
