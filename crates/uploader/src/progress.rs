use blobup_transfer::Part;
use serde::{Deserialize, Serialize};

/// Percent values above this are reported as complete.
const COMPLETE_THRESHOLD: f64 = 0.9999;

/// Upload progress as published on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Source size in bytes.
    pub total: u64,
    /// Provisional bytes, including in-flight streaming progress.
    pub uploaded: u64,
    /// `uploaded / total`, clamped to 1.0.
    pub percent: f64,
    /// Bytes in parts the server has acknowledged.
    pub sure_uploaded: u64,
    pub sure_percent: f64,
    pub parts: u32,
    pub parts_completed: u32,
}

/// Aggregates per-part progress into session totals.
///
/// Each part contributes the highest byte count seen for it across all of
/// its attempts, so a retry that restarts from zero neither double counts
/// nor moves the total backwards.
#[derive(Debug)]
pub(crate) struct ProgressAggregator {
    total: u64,
    lengths: Vec<u64>,
    contributions: Vec<u64>,
    provisional: u64,
    confirmed: u64,
    parts_completed: u32,
}

impl ProgressAggregator {
    pub(crate) fn new(total: u64, parts: &[Part]) -> Self {
        Self {
            total,
            lengths: parts.iter().map(Part::len).collect(),
            contributions: vec![0; parts.len()],
            provisional: 0,
            confirmed: 0,
            parts_completed: 0,
        }
    }

    /// Records streaming progress. Returns whether the total moved.
    pub(crate) fn on_progress(&mut self, part: u32, sent: u64) -> bool {
        let Some(slot) = slot(part, self.lengths.len()) else {
            return false;
        };
        let sent = sent.min(self.lengths[slot]);
        let current = self.contributions[slot];
        if sent <= current {
            return false;
        }
        self.provisional += sent - current;
        self.contributions[slot] = sent;
        true
    }

    /// Records a part the server acknowledged.
    pub(crate) fn on_complete(&mut self, part: u32, acknowledged: u64) {
        let Some(slot) = slot(part, self.lengths.len()) else {
            return;
        };
        let full = self.lengths[slot];
        let current = self.contributions[slot];
        if full > current {
            self.provisional += full - current;
            self.contributions[slot] = full;
        }
        self.confirmed += acknowledged;
        self.parts_completed += 1;
    }

    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        let parts = self.lengths.len() as u32;
        let all_done = self.parts_completed >= parts;
        ProgressSnapshot {
            total: self.total,
            uploaded: self.provisional,
            percent: clamp_percent(ratio(self.provisional, self.total, all_done)),
            sure_uploaded: self.confirmed,
            sure_percent: ratio(self.confirmed, self.total, all_done).min(1.0),
            parts,
            parts_completed: self.parts_completed,
        }
    }
}

fn slot(part: u32, len: usize) -> Option<usize> {
    let slot = (part as usize).checked_sub(1)?;
    (slot < len).then_some(slot)
}

fn ratio(done: u64, total: u64, all_done: bool) -> f64 {
    if total == 0 {
        return if all_done { 1.0 } else { 0.0 };
    }
    done as f64 / total as f64
}

fn clamp_percent(percent: f64) -> f64 {
    if percent > COMPLETE_THRESHOLD {
        1.0
    } else {
        percent
    }
}
