//! Part planning, ranged file reads and content hashing for multipart uploads.

mod chunked;
mod mime;
mod planner;
mod rate;

pub use chunked::{ContentHasher, Sha256Hasher, checksum_bytes, read_range};
pub use mime::{DEFAULT_CONTENT_TYPE, detect_content_type};
pub use planner::{Part, part_count, plan};
pub use rate::ThroughputMeter;

/// Default part size: 5 MiB.
///
/// This is also the smallest part size S3 accepts for every part but the last.
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {start}..{end} is outside a {size}-byte file")]
    RangeOutOfBounds { start: u64, end: u64, size: u64 },

    #[error("too many parts: {0}")]
    TooManyParts(u64),

    #[error("not a regular file: {0}")]
    NotAFile(String),
}
