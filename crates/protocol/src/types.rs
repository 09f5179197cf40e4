use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::UNSIGNED_PAYLOAD;

/// Opaque session token issued by `multipartStart`.
///
/// The client never inspects it; it is echoed verbatim as `sendBackData`
/// on every subsequent call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub serde_json::Value);

impl SessionToken {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Metadata describing the file being uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date: Option<DateTime<Utc>>,
}

/// Content hash attached to a part signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentHash {
    /// The body is not hashed; the signature covers an unsigned payload.
    Unsigned,
    /// Hex-encoded digest of the part body.
    Digest(String),
}

impl ContentHash {
    /// Value sent in the `ContentSHA256` parameter.
    pub fn as_wire(&self) -> &str {
        match self {
            ContentHash::Unsigned => UNSIGNED_PAYLOAD,
            ContentHash::Digest(hex) => hex,
        }
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, ContentHash::Unsigned)
    }
}
