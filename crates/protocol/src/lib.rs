//! Wire protocol types shared between the upload orchestrator and the
//! multipart signing endpoint.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::Action;
pub use envelope::{Envelope, EnvelopeError};
pub use messages::{
    AbortSessionRequest, AbortSessionResponse, CompleteSessionRequest, SignPartRequest,
    SignedPart, StartSessionRequest,
};
pub use types::{ContentHash, FileInfo, SessionToken};
