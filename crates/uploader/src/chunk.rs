//! Per-part upload task: hash, sign, transfer, retry.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use blobup_protocol::constants::{HEADER_AMZ_DATE, HEADER_AUTHORIZATION, PUT_SUCCESS_STATUS};
use blobup_protocol::{ContentHash, SessionToken, SignPartRequest};
use blobup_transfer::{ContentHasher, Part};
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::dispatcher::PartState;
use crate::error::{ChunkError, ServiceError};
use crate::service::{ProgressSink, PutRequest, SigningService, Transport};
use crate::source::UploadSource;

/// Report from a part task to the session's control loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChunkEvent {
    Phase {
        part: u32,
        attempt: u32,
        state: PartState,
    },
    Progress {
        part: u32,
        sent: u64,
    },
    /// An attempt failed and another one will follow.
    Retrying {
        part: u32,
        attempt: u32,
        error: ChunkError,
    },
    Done {
        part: u32,
        attempts: u32,
        acknowledged: u64,
    },
    Failed {
        part: u32,
        attempts: u32,
        error: ChunkError,
    },
}

/// Everything a part task needs, shared across parts of one session.
#[derive(Clone)]
pub(crate) struct ChunkContext {
    pub token: SessionToken,
    pub signer: Arc<dyn SigningService>,
    pub transport: Arc<dyn Transport>,
    pub source: Arc<dyn UploadSource>,
    pub hasher: Option<Arc<dyn ContentHasher>>,
    pub max_tries: u32,
    pub attempt_timeout: Option<Duration>,
    pub retry: RetryConfig,
    pub events: mpsc::Sender<ChunkEvent>,
}

enum Interrupt {
    Cancelled,
    Failed(ChunkError),
}

impl From<ChunkError> for Interrupt {
    fn from(e: ChunkError) -> Self {
        Interrupt::Failed(e)
    }
}

/// Uploads one part, retrying until it succeeds, runs out of attempts, or
/// is cancelled.
pub(crate) struct ChunkUploader {
    part: Part,
    ctx: ChunkContext,
    cancel: CancellationToken,
    /// Attempt in progress, kept outside the attempt loop so a panic can
    /// still report it.
    attempt: AtomicU32,
}

impl ChunkUploader {
    pub(crate) fn new(part: Part, ctx: ChunkContext, cancel: CancellationToken) -> Self {
        Self {
            part,
            ctx,
            cancel,
            attempt: AtomicU32::new(0),
        }
    }

    /// Runs to a terminal outcome. Reports exactly one `Done` or `Failed`
    /// unless cancelled, in which case it goes quiet.
    pub(crate) async fn run(self) {
        let part = self.part.index;
        let events = self.ctx.events.clone();
        let cancel = self.cancel.clone();

        let ran = AssertUnwindSafe(self.run_attempts()).catch_unwind().await;
        if ran.is_err() && !cancel.is_cancelled() {
            let _ = events
                .send(ChunkEvent::Failed {
                    part,
                    attempts: self.attempt.load(Ordering::Acquire).max(1),
                    error: ChunkError::Panicked,
                })
                .await;
        }
    }

    async fn run_attempts(&self) {
        let part = self.part.index;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.attempt.store(attempt, Ordering::Release);
            if self.cancel.is_cancelled() {
                return;
            }

            let result = match self.ctx.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, self.attempt(attempt))
                    .await
                    .unwrap_or(Err(Interrupt::Failed(ChunkError::Timeout(limit)))),
                None => self.attempt(attempt).await,
            };

            let error = match result {
                Ok(acknowledged) => {
                    debug!(part, attempt, acknowledged, "part uploaded");
                    self.emit(ChunkEvent::Done {
                        part,
                        attempts: attempt,
                        acknowledged,
                    })
                    .await;
                    return;
                }
                Err(Interrupt::Cancelled) => {
                    debug!(part, attempt, "part cancelled");
                    return;
                }
                Err(Interrupt::Failed(error)) => error,
            };

            if self.cancel.is_cancelled() {
                return;
            }
            if attempt >= self.ctx.max_tries {
                self.emit(ChunkEvent::Failed {
                    part,
                    attempts: attempt,
                    error,
                })
                .await;
                return;
            }

            warn!(part, attempt, max_tries = self.ctx.max_tries, error = %error, "part attempt failed, retrying");
            self.emit(ChunkEvent::Retrying {
                part,
                attempt,
                error,
            })
            .await;

            let delay = self.ctx.retry.delay_for_retry(attempt);
            if !delay.is_zero() && self.interruptible(tokio::time::sleep(delay)).await.is_err() {
                return;
            }
        }
    }

    /// One hash/sign/transfer pass. Returns the acknowledged byte count.
    async fn attempt(&self, attempt: u32) -> Result<u64, Interrupt> {
        let part = self.part.index;

        let body = self
            .interruptible(self.ctx.source.read_range(self.part.range()))
            .await?
            .map_err(|e| ChunkError::Read(e.to_string()))?;

        let hash = match &self.ctx.hasher {
            Some(hasher) => {
                self.phase(attempt, PartState::Hashing).await?;
                debug!(part, attempt, algorithm = hasher.name(), "hashing part");
                let hasher = Arc::clone(hasher);
                let data = body.clone();
                let digest = self
                    .interruptible(tokio::task::spawn_blocking(move || hasher.digest(&data)))
                    .await?
                    .map_err(|e| ChunkError::Hash(e.to_string()))?;
                ContentHash::Digest(digest)
            }
            None => ContentHash::Unsigned,
        };

        self.phase(attempt, PartState::Signing).await?;
        let request = SignPartRequest {
            part_number: part,
            content_length: self.part.len(),
            content_sha256: hash.as_wire().to_string(),
            send_back_data: self.ctx.token.clone(),
        };
        let signed = self
            .interruptible(self.ctx.signer.sign_part(request))
            .await?
            .map_err(ChunkError::Sign)?;

        self.phase(attempt, PartState::Transferring).await?;
        let put = PutRequest {
            url: signed.url,
            headers: vec![
                (HEADER_AMZ_DATE.to_string(), signed.date_header),
                (HEADER_AUTHORIZATION.to_string(), signed.auth_header),
            ],
            body,
        };
        let events = self.ctx.events.clone();
        let sink = ProgressSink::new(self.cancel.clone(), move |sent| {
            let _ = events.try_send(ChunkEvent::Progress { part, sent });
        });
        let response = self
            .interruptible(self.ctx.transport.put(put, sink))
            .await?
            .map_err(ChunkError::Transfer)?;

        if response.status != PUT_SUCCESS_STATUS {
            return Err(ChunkError::Transfer(ServiceError::Status(response.status)).into());
        }
        Ok(response.acknowledged)
    }

    /// Awaits `fut` unless the part is cancelled first. Dropping the future
    /// on cancellation is what aborts an in-flight request.
    async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            out = fut => Ok(out),
        }
    }

    async fn phase(&self, attempt: u32, state: PartState) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        self.emit(ChunkEvent::Phase {
            part: self.part.index,
            attempt,
            state,
        })
        .await;
        Ok(())
    }

    async fn emit(&self, event: ChunkEvent) {
        // The control loop may already be gone after a halt.
        let _ = self.ctx.events.send(event).await;
    }
}
