//! Bounded-concurrency admission of parts.
//!
//! The dispatcher owns every counter the scheduler needs and is mutated only
//! by the session's control loop, one chunk event at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use blobup_transfer::Part;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle of one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartState {
    Pending,
    Hashing,
    Signing,
    Transferring,
    Done,
    FailedPermanently,
}

/// Bookkeeping for one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartStatus {
    pub state: PartState,
    /// Attempts started so far.
    pub attempts: u32,
}

/// Why admission stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A part exhausted its attempts.
    Failed { part: u32 },
    /// The user aborted.
    Cancelled,
}

/// Result of an admission pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Parts launched by this pass, possibly none when the window is full.
    Dispatched(Vec<u32>),
    /// Every part is dispatched and none is still in flight.
    AllDone,
    /// The latch is tripped; nothing more will be admitted.
    Halted,
}

/// Result of reporting a permanent part failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// First failure: the latch is now tripped and every other in-flight
    /// part has been cancelled.
    First,
    /// The latch was already tripped; the part is recorded only.
    Repeat,
    /// The part was not in flight.
    Stale,
}

/// Admits parts in index order under a concurrency bound and a one-way
/// failure latch.
#[derive(Debug)]
pub struct Dispatcher {
    parts: Vec<Part>,
    status: Vec<PartStatus>,
    max_concurrency: usize,
    active: BTreeMap<u32, CancellationToken>,
    highest_dispatched: u32,
    completed: u32,
    halt: Option<HaltReason>,
    failed: BTreeSet<u32>,
}

impl Dispatcher {
    pub fn new(parts: Vec<Part>, max_concurrency: NonZeroUsize) -> Self {
        let status = vec![
            PartStatus {
                state: PartState::Pending,
                attempts: 0,
            };
            parts.len()
        ];
        Self {
            parts,
            status,
            max_concurrency: max_concurrency.get(),
            active: BTreeMap::new(),
            highest_dispatched: 0,
            completed: 0,
            halt: None,
            failed: BTreeSet::new(),
        }
    }

    fn total(&self) -> u32 {
        self.parts.len() as u32
    }

    fn status_mut(&mut self, part: u32) -> Option<&mut PartStatus> {
        let slot = (part as usize).checked_sub(1)?;
        self.status.get_mut(slot)
    }

    /// Fills the concurrency window with the next parts in index order.
    ///
    /// `launch` starts the upload for a part and returns the token that
    /// cancels it.
    pub fn admit(&mut self, mut launch: impl FnMut(&Part) -> CancellationToken) -> Admission {
        if self.halt.is_some() {
            return Admission::Halted;
        }

        let mut launched = Vec::new();
        while self.active.len() < self.max_concurrency && self.highest_dispatched < self.total() {
            let next = self.highest_dispatched + 1;
            let part = self.parts[(next - 1) as usize];
            let token = launch(&part);
            self.active.insert(next, token);
            self.highest_dispatched = next;
            launched.push(next);
        }

        if !launched.is_empty() {
            debug!(parts = ?launched, active = self.active.len(), "parts dispatched");
        }

        if launched.is_empty() && self.highest_dispatched == self.total() && self.active.is_empty()
        {
            Admission::AllDone
        } else {
            Admission::Dispatched(launched)
        }
    }

    /// Records a phase change reported by an in-flight part.
    pub fn on_phase(&mut self, part: u32, attempt: u32, state: PartState) {
        if !self.active.contains_key(&part) {
            return;
        }
        if let Some(status) = self.status_mut(part) {
            status.state = state;
            status.attempts = status.attempts.max(attempt);
        }
    }

    /// Records a part the server acknowledged. Returns `false` if the report
    /// is stale (part not in flight, or admission already halted).
    pub fn on_part_done(&mut self, part: u32) -> bool {
        if self.halt.is_some() || self.active.remove(&part).is_none() {
            return false;
        }
        self.completed += 1;
        if let Some(status) = self.status_mut(part) {
            status.state = PartState::Done;
        }
        true
    }

    /// Records a part that exhausted its attempts.
    ///
    /// The first failure trips the latch and cancels every other in-flight
    /// part; later failures are recorded without further action.
    pub fn on_part_failed(&mut self, part: u32, attempts: u32) -> FailureOutcome {
        if self.active.remove(&part).is_none() {
            return FailureOutcome::Stale;
        }
        self.failed.insert(part);
        if let Some(status) = self.status_mut(part) {
            status.state = PartState::FailedPermanently;
            status.attempts = status.attempts.max(attempts);
        }

        if self.halt.is_some() {
            return FailureOutcome::Repeat;
        }
        self.halt = Some(HaltReason::Failed { part });
        self.cancel_active();
        FailureOutcome::First
    }

    /// Trips the latch for a user abort and cancels every in-flight part.
    /// Returns `false` if the latch was already tripped.
    pub fn cancel(&mut self) -> bool {
        if self.halt.is_some() {
            return false;
        }
        self.halt = Some(HaltReason::Cancelled);
        self.cancel_active();
        true
    }

    fn cancel_active(&self) {
        for token in self.active.values() {
            token.cancel();
        }
        if !self.active.is_empty() {
            debug!(parts = ?self.active.keys().collect::<Vec<_>>(), "in-flight parts cancelled");
        }
    }

    /// Whether streaming reports for `part` should still be counted.
    pub fn is_in_flight(&self, part: u32) -> bool {
        self.halt.is_none() && self.active.contains_key(&part)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn completed_count(&self) -> u32 {
        self.completed
    }

    pub fn highest_dispatched(&self) -> u32 {
        self.highest_dispatched
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halt
    }

    pub fn failed_parts(&self) -> impl Iterator<Item = u32> + '_ {
        self.failed.iter().copied()
    }

    pub fn status(&self, part: u32) -> Option<PartStatus> {
        let slot = (part as usize).checked_sub(1)?;
        self.status.get(slot).copied()
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }
}
