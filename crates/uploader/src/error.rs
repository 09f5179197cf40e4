//! Upload error types.

use std::time::Duration;

use crate::session::SessionState;

/// Failure reported by a collaborator (signing endpoint or transport).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// The endpoint answered without a success indicator.
    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Why a single part attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChunkError {
    #[error("reading part failed: {0}")]
    Read(String),

    #[error("hashing part failed: {0}")]
    Hash(String),

    #[error("signing part failed: {0}")]
    Sign(ServiceError),

    #[error("transferring part failed: {0}")]
    Transfer(ServiceError),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("part task panicked")]
    Panicked,
}

/// Errors returned by [`UploadSession::start`](crate::UploadSession::start).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The source cannot be read in ranges, so nothing can be uploaded.
    #[error("unsupported source: {0}")]
    UnsupportedEnvironment(String),

    #[error("couldn't start the upload: {0}")]
    SessionStart(ServiceError),

    #[error("part {part} failed after {attempts} attempts: {error}")]
    ChunkPermanent {
        part: u32,
        attempts: u32,
        error: ChunkError,
        /// Every part that had failed when the upload halted, ascending.
        failed_parts: Vec<u32>,
    },

    /// The remote stitch call failed; the session stays in `Completing`.
    #[error("couldn't complete the upload: {0}")]
    Completion(ServiceError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("upload vetoed by a beforeUpload handler")]
    Vetoed,

    #[error("upload was cancelled")]
    Cancelled,

    #[error("transfer error: {0}")]
    Transfer(#[from] blobup_transfer::TransferError),
}
