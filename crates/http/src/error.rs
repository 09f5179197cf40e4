use blobup_protocol::EnvelopeError;
use blobup_uploader::ServiceError;

/// Errors from the HTTP collaborators.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("invalid server URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request parameters must be a JSON object, got {0}")]
    InvalidParams(&'static str),

    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl From<HttpError> for ServiceError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Envelope(EnvelopeError::Rejected(message)) => ServiceError::Rejected(message),
            HttpError::Status { status, .. } => ServiceError::Status(status),
            HttpError::Json(e) => ServiceError::Decode(e.to_string()),
            e @ HttpError::Envelope(EnvelopeError::MissingResult) => ServiceError::Decode(e.to_string()),
            other => ServiceError::Transport(other.to_string()),
        }
    }
}
