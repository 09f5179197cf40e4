use serde::{Deserialize, Serialize};

use crate::types::{FileInfo, SessionToken};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens a multipart session for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub file_info: FileInfo,
}

/// Requests a pre-authorized destination for one part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPartRequest {
    pub part_number: u32,
    pub content_length: u64,
    #[serde(rename = "ContentSHA256")]
    pub content_sha256: String,
    pub send_back_data: SessionToken,
}

/// Asks the server to stitch the uploaded parts together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionRequest {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub request_type: String,
    pub send_back_data: SessionToken,
}

/// Discards a multipart session and its uploaded parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortSessionRequest {
    pub send_back_data: SessionToken,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Signed destination for a single part upload attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPart {
    pub url: String,
    pub auth_header: String,
    pub date_header: String,
}

/// Result of an abort request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortSessionResponse {
    #[serde(default)]
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;

    fn token() -> SessionToken {
        SessionToken::new(serde_json::json!({"uploadId": "up-1", "key": "abc.bin"}))
    }

    #[test]
    fn sign_part_request_field_names() {
        let req = SignPartRequest {
            part_number: 3,
            content_length: 5_000_000,
            content_sha256: "UNSIGNED-PAYLOAD".into(),
            send_back_data: token(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["partNumber"], 3);
        assert_eq!(json["contentLength"], 5_000_000);
        assert_eq!(json["ContentSHA256"], "UNSIGNED-PAYLOAD");
        assert_eq!(json["sendBackData"]["uploadId"], "up-1");
    }

    #[test]
    fn complete_request_field_names() {
        let req = CompleteSessionRequest {
            mime_type: "video/mp4".into(),
            request_type: "blob".into(),
            send_back_data: token(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "video/mp4");
        assert_eq!(json["requestType"], "blob");
    }

    #[test]
    fn signed_part_from_server_response() {
        let body = r#"{
            "result": {
                "url": "https://bucket.s3.amazonaws.com/abc.bin?partNumber=1&uploadId=up-1",
                "authHeader": "AWS4-HMAC-SHA256 Credential=...",
                "dateHeader": "20240101T000000Z"
            },
            "ok": true
        }"#;
        let env: Envelope<SignedPart> = serde_json::from_str(body).unwrap();
        let part = env.into_result().unwrap();
        assert!(part.url.contains("partNumber=1"));
        assert_eq!(part.date_header, "20240101T000000Z");
    }

    #[test]
    fn abort_response_defaults_to_unsuccessful() {
        let resp: AbortSessionResponse = serde_json::from_str("{}").unwrap();
        assert!(!resp.success);
    }
}
