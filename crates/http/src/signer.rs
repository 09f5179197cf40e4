//! Signing endpoint client.

use std::time::Duration;

use blobup_protocol::constants::ACTION_PARAM;
use blobup_protocol::{
    AbortSessionRequest, AbortSessionResponse, Action, CompleteSessionRequest, Envelope, FileInfo,
    SessionToken, SignPartRequest, SignedPart, StartSessionRequest,
};
use blobup_uploader::{BoxFuture, ServiceError, SigningService};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::params::encode_params;

/// How request parameters travel to the endpoint. The `action` parameter is
/// always in the query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    /// Parameters in the query string.
    #[default]
    Get,
    /// Parameters as a form-encoded body.
    Post,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Signing endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub method: RequestMethod,
    /// Per-call timeout. 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            method: RequestMethod::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SignerConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// [`SigningService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSigningService {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    method: RequestMethod,
}

impl HttpSigningService {
    pub fn new(config: &SignerConfig) -> Result<Self, HttpError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Self::with_client(builder.build()?, config)
    }

    /// Uses an existing client, e.g. one shared with the transport.
    pub fn with_client(http: reqwest::Client, config: &SignerConfig) -> Result<Self, HttpError> {
        let endpoint =
            reqwest::Url::parse(&config.server_url).map_err(|e| HttpError::InvalidUrl {
                url: config.server_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            endpoint,
            method: config.method,
        })
    }

    /// Performs one endpoint call and unwraps the response envelope.
    async fn call<B, T>(&self, action: Action, body: &B) -> Result<T, HttpError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let params = encode_params(body)?;
        let action_param = [(ACTION_PARAM, action.as_str())];
        debug!(%action, params = params.len(), "calling signing endpoint");

        let request = match self.method {
            RequestMethod::Get => self
                .http
                .get(self.endpoint.clone())
                .query(&action_param)
                .query(&params),
            RequestMethod::Post => self
                .http
                .post(self.endpoint.clone())
                .query(&action_param)
                .form(&params),
        };

        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        decode_response(status, &body)
    }
}

/// Decodes an endpoint response.
///
/// The endpoint reports failures as `{"ok": false, "error": ...}` with a 5xx
/// status, so the envelope is read before the status is considered.
fn decode_response<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, HttpError> {
    let success = (200..300).contains(&status);
    let envelope: Envelope<serde_json::Value> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(_) if !success => {
            return Err(HttpError::Status {
                status,
                body: String::from_utf8_lossy(body).into_owned(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    if envelope.ok && !success {
        return Err(HttpError::Status {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }
    let result = envelope.into_result()?;
    Ok(serde_json::from_value(result)?)
}

impl SigningService for HttpSigningService {
    fn start_session(&self, file: FileInfo) -> BoxFuture<'_, Result<SessionToken, ServiceError>> {
        Box::pin(async move {
            let request = StartSessionRequest { file_info: file };
            Ok(self.call(Action::Start, &request).await?)
        })
    }

    fn sign_part(&self, request: SignPartRequest) -> BoxFuture<'_, Result<SignedPart, ServiceError>> {
        Box::pin(async move { Ok(self.call(Action::SignPart, &request).await?) })
    }

    fn complete_session(
        &self,
        request: CompleteSessionRequest,
    ) -> BoxFuture<'_, Result<serde_json::Value, ServiceError>> {
        Box::pin(async move { Ok(self.call(Action::Complete, &request).await?) })
    }

    fn abort_session(&self, request: AbortSessionRequest) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(async move {
            let response: AbortSessionResponse = self.call(Action::Abort, &request).await?;
            if !response.success {
                warn!("signing endpoint did not confirm the abort");
            }
            Ok(())
        })
    }
}
