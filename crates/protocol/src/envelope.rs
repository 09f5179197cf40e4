use serde::{Deserialize, Serialize};

/// Errors produced when unwrapping an [`Envelope`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("response has no result")]
    MissingResult,
}

/// Envelope for every signing-endpoint response.
///
/// A missing `ok` flag deserializes as `false`, so a response without an
/// explicit success indicator is treated as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    /// Creates a successful envelope.
    pub fn success(result: T) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failed envelope with an error message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(message.into()),
        }
    }

    /// Returns the result if the server reported success.
    pub fn into_result(self) -> Result<T, EnvelopeError> {
        if !self.ok {
            return Err(EnvelopeError::Rejected(
                self.error.unwrap_or_else(|| "request not acknowledged".into()),
            ));
        }
        self.result.ok_or(EnvelopeError::MissingResult)
    }
}
