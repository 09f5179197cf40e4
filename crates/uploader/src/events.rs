//! Typed publish/subscribe for upload lifecycle events.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::progress::ProgressSnapshot;

/// Event names observers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeUpload,
    StartUpload,
    Progress,
    ProgressStats,
    Finishing,
    Complete,
    Error,
    Cancel,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BeforeUpload => "beforeUpload",
            EventKind::StartUpload => "startUpload",
            EventKind::Progress => "progress",
            EventKind::ProgressStats => "progressStats",
            EventKind::Finishing => "finishing",
            EventKind::Complete => "complete",
            EventKind::Error => "error",
            EventKind::Cancel => "cancel",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub ok: bool,
    /// Context, e.g. `{"partNum": 3}` or `{"message": "..."}`.
    pub result: serde_json::Value,
    pub error: String,
}

impl ErrorReport {
    pub fn new(result: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelResult {
    pub message: String,
}

/// Payload of a `cancel` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelReport {
    pub ok: bool,
    pub result: CancelResult,
}

impl CancelReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: CancelResult {
                message: message.into(),
            },
        }
    }
}

/// An upload lifecycle event with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Before any remote call. A vetoing handler cancels the upload.
    BeforeUpload,
    /// The remote session is open.
    StartUpload,
    Progress(f64),
    ProgressStats(ProgressSnapshot),
    /// All parts are uploaded; the stitch call is in flight.
    Finishing,
    Complete(serde_json::Value),
    Error(ErrorReport),
    Cancel(CancelReport),
}

impl UploadEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UploadEvent::BeforeUpload => EventKind::BeforeUpload,
            UploadEvent::StartUpload => EventKind::StartUpload,
            UploadEvent::Progress(_) => EventKind::Progress,
            UploadEvent::ProgressStats(_) => EventKind::ProgressStats,
            UploadEvent::Finishing => EventKind::Finishing,
            UploadEvent::Complete(_) => EventKind::Complete,
            UploadEvent::Error(_) => EventKind::Error,
            UploadEvent::Cancel(_) => EventKind::Cancel,
        }
    }
}

/// Identifies a subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&UploadEvent) -> bool + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Filter {
    Kind(EventKind),
    Any,
}

struct Subscription {
    id: HandlerId,
    filter: Filter,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// Event dispatcher shared between a session and its observers.
///
/// Handlers return `true` to let the default behavior proceed and `false` to
/// veto it. Handlers for the specific kind run first, then catch-all
/// handlers; every handler runs even after a veto.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, filter: Filter, handler: Handler) -> HandlerId {
        let mut inner = self.lock();
        let id = HandlerId(inner.next_id);
        inner.next_id += 1;
        inner.subscriptions.push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    /// Subscribes to one event kind.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&UploadEvent) -> bool + Send + Sync + 'static,
    ) -> HandlerId {
        self.add(Filter::Kind(kind), Arc::new(handler))
    }

    /// Subscribes to every event. The handler can read the name via
    /// [`UploadEvent::kind`].
    pub fn subscribe_any(
        &self,
        handler: impl Fn(&UploadEvent) -> bool + Send + Sync + 'static,
    ) -> HandlerId {
        self.add(Filter::Any, Arc::new(handler))
    }

    /// Forwards every event into `tx`. Events are dropped when the channel
    /// is full or closed.
    pub fn forward_to(&self, tx: mpsc::Sender<UploadEvent>) -> HandlerId {
        self.subscribe_any(move |event| {
            let _ = tx.try_send(event.clone());
            true
        })
    }

    /// Removes one handler. Returns whether it was registered.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        inner.subscriptions.len() != before
    }

    /// Removes every handler for `kind`. Catch-all handlers are kept.
    pub fn unsubscribe_kind(&self, kind: EventKind) {
        self.lock()
            .subscriptions
            .retain(|s| s.filter != Filter::Kind(kind));
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.lock().subscriptions.clear();
    }

    pub fn handler_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Delivers `event`. Returns `true` if no handler vetoed.
    pub fn publish(&self, event: &UploadEvent) -> bool {
        let kind = event.kind();
        // Collect first so handlers can (un)subscribe without deadlocking.
        let handlers: Vec<Handler> = {
            let inner = self.lock();
            let specific = inner
                .subscriptions
                .iter()
                .filter(|s| s.filter == Filter::Kind(kind));
            let any = inner.subscriptions.iter().filter(|s| s.filter == Filter::Any);
            specific.chain(any).map(|s| Arc::clone(&s.handler)).collect()
        };

        let mut proceed = true;
        for handler in handlers {
            proceed &= handler(event);
        }
        proceed
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
