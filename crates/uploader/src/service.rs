//! Collaborator traits: the signing endpoint and the part transport.
//!
//! Both are implemented over HTTP in `blobup-http` and by in-test mocks.
//! Trait methods return boxed futures so they stay object-safe behind
//! `Arc<dyn ...>`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use blobup_protocol::{
    AbortSessionRequest, CompleteSessionRequest, FileInfo, SessionToken, SignPartRequest,
    SignedPart,
};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;

/// Boxed, sendable future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote endpoint that manages the multipart session and signs parts.
pub trait SigningService: Send + Sync {
    /// Opens a session and returns the opaque token to echo on later calls.
    fn start_session(&self, file: FileInfo) -> BoxFuture<'_, Result<SessionToken, ServiceError>>;

    /// Returns a pre-authorized destination for one part attempt.
    fn sign_part(&self, request: SignPartRequest)
    -> BoxFuture<'_, Result<SignedPart, ServiceError>>;

    /// Stitches the uploaded parts; the payload is server-defined.
    fn complete_session(
        &self,
        request: CompleteSessionRequest,
    ) -> BoxFuture<'_, Result<serde_json::Value, ServiceError>>;

    /// Discards the session. Callers treat this as best-effort.
    fn abort_session(&self, request: AbortSessionRequest) -> BoxFuture<'_, Result<(), ServiceError>>;
}

/// A single part PUT.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Terminal result of a PUT that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutResponse {
    pub status: u16,
    /// Bytes the server acknowledged for this part.
    pub acknowledged: u64,
}

/// Performs part PUTs.
///
/// Dropping the returned future cancels the request. Implementations report
/// streaming progress through the [`ProgressSink`] as absolute byte counts.
pub trait Transport: Send + Sync {
    fn put(
        &self,
        request: PutRequest,
        progress: ProgressSink,
    ) -> BoxFuture<'_, Result<PutResponse, ServiceError>>;
}

struct SinkInner {
    high_water: AtomicU64,
    cancel: CancellationToken,
    notify: Box<dyn Fn(u64) + Send + Sync>,
}

/// Receives streaming progress for one part attempt.
///
/// Reports are forwarded only when they grow, and never once the attempt has
/// been cancelled.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<SinkInner>,
}

impl ProgressSink {
    pub fn new(cancel: CancellationToken, notify: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                high_water: AtomicU64::new(0),
                cancel,
                notify: Box::new(notify),
            }),
        }
    }

    /// A sink that drops every report.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), |_| {})
    }

    /// Reports the total bytes sent so far in this attempt.
    pub fn report(&self, bytes_sent: u64) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let previous = self.inner.high_water.fetch_max(bytes_sent, Ordering::AcqRel);
        if bytes_sent > previous {
            (self.inner.notify)(bytes_sent);
        }
    }

    /// Highest count reported so far.
    pub fn reported(&self) -> u64 {
        self.inner.high_water.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("reported", &self.reported())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_sink(cancel: CancellationToken) -> (ProgressSink, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sink = ProgressSink::new(cancel, move |n| s.lock().unwrap().push(n));
        (sink, seen)
    }

    #[test]
    fn forwards_only_increasing_reports() {
        let (sink, seen) = recording_sink(CancellationToken::new());
        for n in [10, 5, 10, 20, 15, 30] {
            sink.report(n);
        }
        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
        assert_eq!(sink.reported(), 30);
    }

    #[test]
    fn silent_after_cancel() {
        let cancel = CancellationToken::new();
        let (sink, seen) = recording_sink(cancel.clone());
        sink.report(10);
        cancel.cancel();
        sink.report(20);
        assert_eq!(*seen.lock().unwrap(), vec![10]);
    }

    #[test]
    fn clones_share_high_water() {
        let (sink, seen) = recording_sink(CancellationToken::new());
        let other = sink.clone();
        sink.report(50);
        other.report(40);
        other.report(60);
        assert_eq!(*seen.lock().unwrap(), vec![50, 60]);
    }

    #[test]
    fn detached_sink_accepts_reports() {
        let sink = ProgressSink::detached();
        sink.report(1);
        assert_eq!(sink.reported(), 1);
    }
}
