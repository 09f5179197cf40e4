//! Streaming PUT of part bodies.

use blobup_uploader::{BoxFuture, ProgressSink, PutRequest, PutResponse, ServiceError, Transport};
use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream;
use reqwest::Body;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::error::HttpError;

/// Size of the pieces a part body is streamed in. Progress is reported at
/// this granularity.
pub const DEFAULT_STREAM_CHUNK: usize = 64 * 1024;

/// [`Transport`] over HTTP.
///
/// No request timeout is set here; the orchestrator bounds each attempt.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    chunk_size: usize,
}

impl HttpTransport {
    pub fn new() -> Result<Self, HttpError> {
        Ok(Self::with_client(reqwest::Client::builder().build()?))
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            chunk_size: DEFAULT_STREAM_CHUNK,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn send(&self, request: PutRequest, progress: ProgressSink) -> Result<PutResponse, HttpError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| HttpError::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeader(name.clone()))?;
            headers.insert(header, value);
        }
        let length = request.body.len() as u64;
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

        let body = Body::wrap_stream(progress_stream(
            request.body,
            self.chunk_size,
            progress.clone(),
        ));
        let resp = self
            .http
            .put(&request.url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            progress.report(length);
            return Ok(PutResponse {
                status: status.as_u16(),
                acknowledged: length,
            });
        }

        let text = resp.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %text, "part PUT rejected");
        Ok(PutResponse {
            status: status.as_u16(),
            acknowledged: 0,
        })
    }
}

/// Yields `body` in `chunk_size` slices. Each pull reports the bytes
/// already handed to the connection.
fn progress_stream(
    body: Bytes,
    chunk_size: usize,
    progress: ProgressSink,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let mut offset = 0;
    stream::iter(std::iter::from_fn(move || {
        progress.report(offset as u64);
        if offset >= body.len() {
            return None;
        }
        let end = (offset + chunk_size).min(body.len());
        let piece = body.slice(offset..end);
        offset = end;
        Some(Ok(piece))
    }))
}

impl Transport for HttpTransport {
    fn put(
        &self,
        request: PutRequest,
        progress: ProgressSink,
    ) -> BoxFuture<'_, Result<PutResponse, ServiceError>> {
        Box::pin(async move { Ok(self.send(request, progress).await?) })
    }
}
