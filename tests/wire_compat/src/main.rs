fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use blobup_protocol::{
        AbortSessionRequest, AbortSessionResponse, CompleteSessionRequest, Envelope, FileInfo,
        SessionToken, SignPartRequest, SignedPart,
    };
    use blobup_uploader::{CancelReport, ErrorReport, ProgressSnapshot};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes numbers so that `65` and `65.0` compare equal.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    fn assert_same(name: &str, fixture: &serde_json::Value, ours: &serde_json::Value) {
        assert_eq!(
            normalize_value(fixture),
            normalize_value(ours),
            "mismatch for {name}:\n  endpoint: {fixture}\n  ours:     {ours}"
        );
    }

    /// Deserializes a fixture, re-serializes it and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_same(name, &fixture, &reserialized);
        parsed
    }

    // --- Endpoint responses ---

    #[test]
    fn fixture_start_response() {
        let envelope = roundtrip_test::<Envelope<SessionToken>>("start_response.json");
        let token = envelope.into_result().unwrap();
        assert_eq!(token.as_value()["key"], "5f3c2a9e1b7d4c60.mp4");
    }

    #[test]
    fn fixture_sign_part_response() {
        let envelope = roundtrip_test::<Envelope<SignedPart>>("sign_part_response.json");
        let part = envelope.into_result().unwrap();
        assert!(part.url.contains("partNumber=2"));
        assert_eq!(part.date_header, "20240102T030405Z");
        assert!(part.auth_header.starts_with("AWS4-HMAC-SHA256"));
    }

    #[test]
    fn fixture_complete_response() {
        let envelope = roundtrip_test::<Envelope<serde_json::Value>>("complete_response.json");
        assert_eq!(envelope.into_result().unwrap()["url"], "5f3c2a9e1b7d4c60.mp4");
    }

    #[test]
    fn fixture_abort_response() {
        let envelope = roundtrip_test::<Envelope<AbortSessionResponse>>("abort_response.json");
        assert!(envelope.into_result().unwrap().success);
    }

    #[test]
    fn fixture_error_response() {
        let envelope = roundtrip_test::<Envelope<SignedPart>>("error_response.json");
        let err = envelope.into_result().unwrap_err();
        assert_eq!(
            err,
            blobup_protocol::EnvelopeError::Rejected("Action not found".into())
        );
    }

    // --- Request parameters ---

    #[test]
    fn fixture_file_info() {
        let info = roundtrip_test::<FileInfo>("file_info.json");
        assert_eq!(info.mime_type, "video/mp4");
        assert_eq!(info.size, 12_000_000);
    }

    #[test]
    fn fixture_sign_part_request() {
        let request = roundtrip_test::<SignPartRequest>("sign_part_request.json");
        assert_eq!(request.part_number, 3);
        assert_eq!(request.content_length, 2_000_000);
    }

    #[test]
    fn fixture_complete_request() {
        roundtrip_test::<CompleteSessionRequest>("complete_request.json");
    }

    #[test]
    fn fixture_abort_request() {
        roundtrip_test::<AbortSessionRequest>("abort_request.json");
    }

    /// The bracketed parameter names the endpoint reads from `$_REQUEST`.
    #[test]
    fn sign_part_request_form_keys() {
        let request: SignPartRequest =
            serde_json::from_value(load_fixture("sign_part_request.json")).unwrap();
        let params = blobup_http::encode_params(&request).unwrap();
        let mut keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "ContentSHA256",
                "contentLength",
                "partNumber",
                "sendBackData[key]",
                "sendBackData[uploadId]",
            ]
        );
    }

    // --- Client events ---

    #[test]
    fn fixture_progress_stats() {
        let snapshot = roundtrip_test::<ProgressSnapshot>("progress_stats.json");
        assert_eq!(snapshot.parts_completed, 1);
    }

    #[test]
    fn fixture_error_event() {
        let report = ErrorReport::new(
            serde_json::json!({"partNum": 3}),
            "transferring part failed: unexpected HTTP status 500",
        );
        let ours = serde_json::to_value(&report).unwrap();
        assert_same("error_event.json", &load_fixture("error_event.json"), &ours);
    }

    #[test]
    fn fixture_cancel_event() {
        let ours = serde_json::to_value(CancelReport::new("Upload was cancelled")).unwrap();
        assert_same("cancel_event.json", &load_fixture("cancel_event.json"), &ours);
    }
}
