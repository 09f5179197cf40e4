//! Client-side orchestrator for chunked multipart uploads.
//!
//! An [`UploadSession`] opens a remote session through a [`SigningService`],
//! splits the source into parts, and uploads them through a [`Transport`]
//! with bounded concurrency. Per-part attempts are retried; the first part to
//! exhaust its attempts aborts the whole upload. Observers subscribe to the
//! session's [`EventBus`].

mod chunk;
mod config;
mod dispatcher;
mod error;
mod events;
mod progress;
mod service;
mod session;
mod source;

pub use config::{RetryConfig, UploaderConfig};
pub use dispatcher::{Admission, Dispatcher, FailureOutcome, HaltReason, PartState, PartStatus};
pub use error::{ChunkError, ServiceError, UploadError};
pub use events::{CancelReport, CancelResult, ErrorReport, EventBus, EventKind, HandlerId, UploadEvent};
pub use progress::ProgressSnapshot;
pub use service::{BoxFuture, ProgressSink, PutRequest, PutResponse, SigningService, Transport};
pub use session::{AbortHandle, SessionState, UploadOutcome, UploadSession};
pub use source::{FileSource, MemorySource, SourceMetadata, UploadSource};
