use std::io::SeekFrom;
use std::ops::Range;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Pluggable digest used to sign part bodies.
///
/// Implementations run on a blocking thread and must be cheap to share.
pub trait ContentHasher: Send + Sync {
    /// Short algorithm name for logging.
    fn name(&self) -> &'static str;

    /// Hex-encoded digest of `data`.
    fn digest(&self, data: &[u8]) -> String;
}

/// SHA-256, the digest S3 expects in `x-amz-content-sha256`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn digest(&self, data: &[u8]) -> String {
        checksum_bytes(data)
    }
}

// ---------------------------------------------------------------------------
// Ranged reads
// ---------------------------------------------------------------------------

/// Reads exactly the bytes in `range` from the file at `path`.
///
/// The range must lie within the current file size; a file that shrank since
/// it was planned is reported as [`TransferError::RangeOutOfBounds`].
pub async fn read_range(path: &Path, range: Range<u64>) -> Result<Vec<u8>, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    if range.start > range.end || range.end > size {
        return Err(TransferError::RangeOutOfBounds {
            start: range.start,
            end: range.end,
            size,
        });
    }

    let len = usize::try_from(range.end - range.start).map_err(|_| {
        TransferError::RangeOutOfBounds {
            start: range.start,
            end: range.end,
            size,
        }
    })?;
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(range.start)).await?;
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn checksum_known_value() {
        // SHA-256("hello")
        assert_eq!(
            checksum_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn checksum_empty() {
        assert_eq!(
            checksum_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_hasher_matches_helper() {
        let hasher = Sha256Hasher;
        assert_eq!(hasher.name(), "sha256");
        assert_eq!(hasher.digest(b"part body"), checksum_bytes(b"part body"));
    }

    #[tokio::test]
    async fn read_middle_range() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let path = create_test_file(dir.path(), "data.bin", &data);

        let bytes = read_range(&path, 4_000..6_500).await.unwrap();
        assert_eq!(bytes.len(), 2_500);
        assert_eq!(bytes, &data[4_000..6_500]);
    }

    #[tokio::test]
    async fn read_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "small.txt", b"abcdef");
        assert_eq!(read_range(&path, 0..6).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn read_empty_range() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        assert!(read_range(&path, 0..0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn range_past_end_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "short.bin", b"abc");
        let err = read_range(&path, 1..10).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::RangeOutOfBounds {
                start: 1,
                end: 10,
                size: 3
            }
        ));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_range(&dir.path().join("nope"), 0..1).await.unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }
}
