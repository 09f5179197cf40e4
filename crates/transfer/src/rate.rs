use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct Sample {
    total: u64,
    at: Instant,
}

/// Sliding-window throughput estimate over a cumulative byte counter.
///
/// Feed it the running total (e.g. provisional uploaded bytes) whenever it
/// changes; the rate is the growth across the retained window.
pub struct ThroughputMeter {
    samples: VecDeque<Sample>,
    window: Duration,
    max_samples: usize,
}

impl ThroughputMeter {
    /// Creates a meter with the given window (default 5 s) and sample cap
    /// (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            window: window.unwrap_or(Duration::from_secs(5)),
            max_samples: max_samples.unwrap_or(100).max(2),
        }
    }

    /// Records the cumulative total observed now.
    pub fn record(&mut self, total: u64) {
        self.record_at(total, Instant::now());
    }

    fn record_at(&mut self, total: u64, at: Instant) {
        self.samples.push_back(Sample { total, at });

        while let Some(front) = self.samples.front() {
            if at.duration_since(front.at) > self.window && self.samples.len() > 2 {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average bytes/second across the window; 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.at.duration_since(first.at);
        if elapsed.is_zero() {
            return 0.0;
        }
        last.total.saturating_sub(first.total) as f64 / elapsed.as_secs_f64()
    }

    /// Time left to move `remaining` bytes at the current rate.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(None, None)
    }
}
