//! Top-level upload state machine.
//!
//! `start` runs on the caller's task and is the only place session state
//! changes. Part tasks run on a `JoinSet` and report back over a channel;
//! the control loop applies each report to the [`Dispatcher`] and the
//! progress totals in turn.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use blobup_protocol::{AbortSessionRequest, CompleteSessionRequest, SessionToken};
use blobup_transfer::{ContentHasher, Part, Sha256Hasher};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunk::{ChunkContext, ChunkEvent, ChunkUploader};
use crate::config::UploaderConfig;
use crate::dispatcher::{Admission, Dispatcher, FailureOutcome};
use crate::error::{ChunkError, UploadError};
use crate::events::{CancelReport, ErrorReport, EventBus, UploadEvent};
use crate::progress::{ProgressAggregator, ProgressSnapshot};
use crate::service::{SigningService, Transport};
use crate::source::UploadSource;

const CHUNK_EVENT_CAPACITY: usize = 256;

const MSG_START_FAILED: &str = "Couldn't start the upload";
const MSG_COMPLETE_FAILED: &str = "Couldn't complete the upload";
const MSG_CANCELLED: &str = "Upload was cancelled";

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Uploading,
    /// The stitch call is in flight, or failed and awaits the caller.
    Completing,
    Complete,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Aborted | SessionState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Uploading => "uploading",
            SessionState::Completing => "completing",
            SessionState::Complete => "complete",
            SessionState::Aborted => "aborted",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// Payload returned by the completion call.
    pub result: serde_json::Value,
    pub parts: u32,
    /// Part attempts that failed and were retried.
    pub transient_failures: u32,
    pub progress: ProgressSnapshot,
}

/// Requests cancellation of a running session from any task.
#[derive(Clone)]
pub struct AbortHandle {
    state: Arc<watch::Sender<SessionState>>,
    token: CancellationToken,
}

impl AbortHandle {
    /// Aborts the upload if it is starting or uploading; otherwise a no-op.
    /// Safe to call repeatedly.
    pub fn abort(&self) {
        let state = *self.state.borrow();
        match state {
            SessionState::Starting | SessionState::Uploading => {
                debug!(%state, "abort requested");
                self.token.cancel();
            }
            _ => debug!(%state, "abort ignored"),
        }
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("state", &*self.state.borrow())
            .field("requested", &self.token.is_cancelled())
            .finish()
    }
}

/// One multipart upload.
///
/// A session is single-use: once `start` has left `Idle`, a second call is
/// rejected.
pub struct UploadSession {
    config: UploaderConfig,
    signer: Arc<dyn SigningService>,
    transport: Arc<dyn Transport>,
    hasher: Arc<dyn ContentHasher>,
    events: Arc<EventBus>,
    state: Arc<watch::Sender<SessionState>>,
    abort: CancellationToken,
    running: AtomicBool,
}

impl UploadSession {
    pub fn new(
        config: UploaderConfig,
        signer: Arc<dyn SigningService>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, UploadError> {
        config.validate()?;
        let (state, _) = watch::channel(SessionState::Idle);
        Ok(Self {
            config,
            signer,
            transport,
            hasher: Arc::new(Sha256Hasher),
            events: Arc::new(EventBus::new()),
            state: Arc::new(state),
            abort: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Replaces the digest used when `hash_content` is enabled.
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observes state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            state: Arc::clone(&self.state),
            token: self.abort.clone(),
        }
    }

    /// Aborts the upload. See [`AbortHandle::abort`].
    pub fn abort(&self) {
        self.abort_handle().abort();
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        debug!(from = %prev, to = %next, "session state changed");
    }

    fn publish(&self, event: UploadEvent) -> bool {
        self.events.publish(&event)
    }

    /// Uploads `source` and waits for the outcome.
    pub async fn start(&self, source: Arc<dyn UploadSource>) -> Result<UploadOutcome, UploadError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
            || self.state() != SessionState::Idle
        {
            return Err(UploadError::InvalidState {
                operation: "start",
                state: self.state(),
            });
        }

        let result = self.prepare(source.as_ref());
        let parts = match result {
            Ok(parts) => parts,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e);
            }
        };
        self.run(source, parts).await
    }

    /// Checks that run before anything leaves `Idle`.
    fn prepare(&self, source: &dyn UploadSource) -> Result<Vec<Part>, UploadError> {
        if !source.supports_ranged_reads() {
            let reason = format!("{} cannot be read in ranges", source.metadata().name);
            error!(reason = %reason, "upload not possible");
            self.publish(UploadEvent::Error(ErrorReport::new(
                json!({ "message": MSG_START_FAILED }),
                reason.clone(),
            )));
            return Err(UploadError::UnsupportedEnvironment(reason));
        }

        let parts = blobup_transfer::plan(source.metadata().size, self.config.part_size_nonzero()?)?;

        if !self.publish(UploadEvent::BeforeUpload) {
            info!("upload vetoed before start");
            return Err(UploadError::Vetoed);
        }
        Ok(parts)
    }

    async fn run(
        &self,
        source: Arc<dyn UploadSource>,
        parts: Vec<Part>,
    ) -> Result<UploadOutcome, UploadError> {
        let meta = source.metadata().clone();
        self.set_state(SessionState::Starting);
        info!(
            file = %meta.name,
            size = meta.size,
            parts = parts.len(),
            part_size = self.config.part_size,
            "starting upload"
        );

        let token = match self.signer.start_session(meta.to_file_info()).await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "session start failed");
                self.set_state(SessionState::Failed);
                self.publish(UploadEvent::Error(ErrorReport::new(
                    json!({ "message": MSG_START_FAILED }),
                    e.to_string(),
                )));
                return Err(UploadError::SessionStart(e));
            }
        };

        if self.abort.is_cancelled() {
            info!("upload aborted while starting");
            self.set_state(SessionState::Aborted);
            self.publish(UploadEvent::Cancel(CancelReport::new(MSG_CANCELLED)));
            self.abort_remote(&token).await;
            return Err(UploadError::Cancelled);
        }

        self.set_state(SessionState::Uploading);
        self.publish(UploadEvent::StartUpload);

        let concurrency = self.config.concurrency_nonzero()?;
        let mut progress = ProgressAggregator::new(meta.size, &parts);
        self.publish_progress(&progress);

        let (events_tx, events_rx) = mpsc::channel(CHUNK_EVENT_CAPACITY);
        let ctx = ChunkContext {
            token: token.clone(),
            signer: Arc::clone(&self.signer),
            transport: Arc::clone(&self.transport),
            source,
            hasher: self
                .config
                .hash_content
                .then(|| Arc::clone(&self.hasher)),
            max_tries: self.config.max_tries,
            attempt_timeout: self.config.attempt_timeout(),
            retry: self.config.retry.clone(),
            events: events_tx,
        };

        let mut run = ControlLoop {
            session: self,
            dispatcher: Dispatcher::new(parts, concurrency),
            tasks: JoinSet::new(),
            ctx,
            transient_failures: 0,
        };
        let mut finished = run.drive(events_rx, &mut progress).await;
        run.tasks.shutdown().await;
        // An abort accepted while the last tasks wound down still wins.
        if matches!(finished, Finished::AllDone) && self.abort.is_cancelled() {
            finished = Finished::Cancelled;
        }

        match finished {
            Finished::AllDone => {
                let parts = run.dispatcher.parts().len() as u32;
                let transient_failures = run.transient_failures;
                self.complete(&meta.mime_type, &token).await.map(|result| {
                    let progress = progress.snapshot();
                    info!(
                        parts,
                        transient_failures,
                        bytes = progress.sure_uploaded,
                        "upload complete"
                    );
                    UploadOutcome {
                        result,
                        parts,
                        transient_failures,
                        progress,
                    }
                })
            }
            Finished::Cancelled => {
                info!(
                    completed = run.dispatcher.completed_count(),
                    "upload cancelled"
                );
                self.set_state(SessionState::Aborted);
                self.publish(UploadEvent::Cancel(CancelReport::new(MSG_CANCELLED)));
                self.abort_remote(&token).await;
                Err(UploadError::Cancelled)
            }
            Finished::Failed {
                part,
                attempts,
                error,
            } => {
                let failed_parts = run.dispatcher.failed_parts().collect();
                error!(part, attempts, error = %error, "part failed permanently, aborting upload");
                self.set_state(SessionState::Failed);
                self.publish(UploadEvent::Error(ErrorReport::new(
                    json!({ "partNum": part }),
                    error.to_string(),
                )));
                self.abort_remote(&token).await;
                Err(UploadError::ChunkPermanent {
                    part,
                    attempts,
                    error,
                    failed_parts,
                })
            }
        }
    }

    async fn complete(
        &self,
        mime_type: &str,
        token: &SessionToken,
    ) -> Result<serde_json::Value, UploadError> {
        self.set_state(SessionState::Completing);
        self.publish(UploadEvent::Finishing);

        let request = CompleteSessionRequest {
            mime_type: mime_type.to_string(),
            request_type: self.config.request_type.clone(),
            send_back_data: token.clone(),
        };
        match self.signer.complete_session(request).await {
            Ok(result) => {
                self.set_state(SessionState::Complete);
                self.publish(UploadEvent::Complete(result.clone()));
                Ok(result)
            }
            Err(e) => {
                // No automatic recovery; the session stays in Completing.
                error!(error = %e, "completion failed");
                self.publish(UploadEvent::Error(ErrorReport::new(
                    json!({ "message": MSG_COMPLETE_FAILED }),
                    e.to_string(),
                )));
                Err(UploadError::Completion(e))
            }
        }
    }

    /// Best-effort remote abort; the result is only logged.
    async fn abort_remote(&self, token: &SessionToken) {
        let request = AbortSessionRequest {
            send_back_data: token.clone(),
        };
        match self.signer.abort_session(request).await {
            Ok(()) => debug!("remote session aborted"),
            Err(e) => warn!(error = %e, "remote abort failed"),
        }
    }

    fn publish_progress(&self, progress: &ProgressAggregator) {
        let snapshot = progress.snapshot();
        self.publish(UploadEvent::ProgressStats(snapshot));
        self.publish(UploadEvent::Progress(snapshot.percent));
    }
}

impl fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSession")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

enum Finished {
    AllDone,
    Cancelled,
    Failed {
        part: u32,
        attempts: u32,
        error: ChunkError,
    },
}

/// State owned by one run of the control loop.
struct ControlLoop<'a> {
    session: &'a UploadSession,
    dispatcher: Dispatcher,
    tasks: JoinSet<()>,
    ctx: ChunkContext,
    transient_failures: u32,
}

impl ControlLoop<'_> {
    async fn drive(
        &mut self,
        mut rx: mpsc::Receiver<ChunkEvent>,
        progress: &mut ProgressAggregator,
    ) -> Finished {
        let abort = self.session.abort.clone();

        loop {
            if let Admission::AllDone = self.admit() {
                if abort.is_cancelled() {
                    return Finished::Cancelled;
                }
                return Finished::AllDone;
            }

            tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    self.dispatcher.cancel();
                    return Finished::Cancelled;
                }
                Some(event) = rx.recv() => {
                    if let Some(finished) = self.handle(event, progress) {
                        self.drain_failures(&mut rx);
                        return finished;
                    }
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "part task ended abnormally");
                    }
                }
            }
        }
    }

    fn admit(&mut self) -> Admission {
        let abort = &self.session.abort;
        let tasks = &mut self.tasks;
        let ctx = &self.ctx;
        self.dispatcher.admit(|part| {
            let cancel = abort.child_token();
            let uploader = ChunkUploader::new(*part, ctx.clone(), cancel.clone());
            tasks.spawn(uploader.run());
            cancel
        })
    }

    /// Applies one chunk report. Returns the end of the run, if any.
    fn handle(&mut self, event: ChunkEvent, progress: &mut ProgressAggregator) -> Option<Finished> {
        match event {
            ChunkEvent::Phase {
                part,
                attempt,
                state,
            } => {
                debug!(part, attempt, ?state, "part phase");
                self.dispatcher.on_phase(part, attempt, state);
            }
            ChunkEvent::Progress { part, sent } => {
                if self.dispatcher.is_in_flight(part) && progress.on_progress(part, sent) {
                    self.session.publish_progress(progress);
                }
            }
            ChunkEvent::Retrying {
                part,
                attempt,
                error,
            } => {
                if self.dispatcher.is_in_flight(part) {
                    self.transient_failures += 1;
                    debug!(part, attempt, error = %error, "part will be retried");
                }
            }
            ChunkEvent::Done {
                part,
                attempts,
                acknowledged,
            } => {
                if self.dispatcher.on_part_done(part) {
                    progress.on_complete(part, acknowledged);
                    info!(
                        part,
                        attempts,
                        bytes = acknowledged,
                        completed = self.dispatcher.completed_count(),
                        "part uploaded"
                    );
                    self.session.publish_progress(progress);
                }
            }
            ChunkEvent::Failed {
                part,
                attempts,
                error,
            } => match self.dispatcher.on_part_failed(part, attempts) {
                FailureOutcome::First => {
                    return Some(Finished::Failed {
                        part,
                        attempts,
                        error,
                    });
                }
                FailureOutcome::Repeat => {
                    warn!(part, attempts, error = %error, "additional part failure")
                }
                FailureOutcome::Stale => {}
            },
        }
        None
    }

    /// Records failures already queued when the run ends.
    fn drain_failures(&mut self, rx: &mut mpsc::Receiver<ChunkEvent>) {
        while let Ok(event) = rx.try_recv() {
            if let ChunkEvent::Failed { part, attempts, .. } = event {
                self.dispatcher.on_part_failed(part, attempts);
            }
        }
        let failed: Vec<u32> = self.dispatcher.failed_parts().collect();
        if failed.len() > 1 {
            warn!(parts = ?failed, "multiple parts failed");
        }
    }
}
