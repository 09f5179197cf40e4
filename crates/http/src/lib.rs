//! `reqwest`-backed collaborators for the upload orchestrator.
//!
//! [`HttpSigningService`] talks to a single signing endpoint that selects
//! the operation from an `action` parameter. [`HttpTransport`] PUTs part
//! bodies to the presigned URLs it returns.

mod error;
mod params;
mod signer;
mod transport;

#[cfg(test)]
mod test_support;

pub use error::HttpError;
pub use params::encode_params;
pub use signer::{HttpSigningService, RequestMethod, SignerConfig};
pub use transport::{DEFAULT_STREAM_CHUNK, HttpTransport};
