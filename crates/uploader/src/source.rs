//! Upload sources: where part bytes come from.

use std::ops::Range;
use std::path::{Path, PathBuf};

use blobup_protocol::FileInfo;
use blobup_transfer::{TransferError, detect_content_type};
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::service::BoxFuture;

/// Metadata sent to the signing endpoint when a session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl SourceMetadata {
    pub fn to_file_info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            last_modified_date: self.modified,
        }
    }
}

/// A byte source that can be uploaded in parts.
pub trait UploadSource: Send + Sync {
    fn metadata(&self) -> &SourceMetadata;

    /// Whether [`read_range`](Self::read_range) can serve arbitrary ranges.
    /// Sources that cannot are rejected before any remote call.
    fn supports_ranged_reads(&self) -> bool {
        true
    }

    fn read_range(&self, range: Range<u64>) -> BoxFuture<'_, Result<Bytes, TransferError>>;
}

/// A regular file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    metadata: SourceMetadata,
}

impl FileSource {
    /// Reads the file's metadata. The MIME type is guessed from the extension.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(TransferError::NotAFile(path.display().to_string()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let modified = meta.modified().ok().map(DateTime::<Utc>::from);

        Ok(Self {
            metadata: SourceMetadata {
                name,
                mime_type: detect_content_type(&path).into(),
                size: meta.len(),
                modified,
            },
            path,
        })
    }

    /// Overrides the detected MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.metadata.mime_type = mime_type.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UploadSource for FileSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn read_range(&self, range: Range<u64>) -> BoxFuture<'_, Result<Bytes, TransferError>> {
        Box::pin(async move {
            let data = blobup_transfer::read_range(&self.path, range).await?;
            Ok(Bytes::from(data))
        })
    }
}

/// An in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    metadata: SourceMetadata,
    data: Bytes,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            metadata: SourceMetadata {
                name: name.into(),
                mime_type: mime_type.into(),
                size: data.len() as u64,
                modified: None,
            },
            data,
        }
    }
}

impl UploadSource for MemorySource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn read_range(&self, range: Range<u64>) -> BoxFuture<'_, Result<Bytes, TransferError>> {
        let size = self.metadata.size;
        let result = if range.start > range.end || range.end > size {
            Err(TransferError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                size,
            })
        } else {
            Ok(self.data.slice(range.start as usize..range.end as usize))
        };
        Box::pin(async move { result })
    }
}
