//! Phi-accrual failure detector (spec.md §4.1).
//!
//! Ported from the exponential-inter-arrival model in
//! `gossipy.detector.FailureDetector`, with the bounded FIFO realized as a
//! ring buffer (`VecDeque`) instead of a plain list trimmed from the front.

use std::collections::VecDeque;

/// Synthetic interval recorded for the very first arrival, so `interval_mean`
/// is defined from the start instead of requiring a second heartbeat.
const SEED_INTERVAL_SECS: f64 = 0.75;

/// Upper bound on how many inter-arrival intervals are kept. Older intervals
/// are evicted oldest-first.
const MAX_INTERVALS: usize = 1000;

/// Tracks heartbeat inter-arrival times for one remote peer and converts
/// elapsed silence into a continuous suspicion level (phi).
pub struct FailureDetector {
    intervals: VecDeque<f64>,
    last_time: Option<f64>,
    capacity: usize,
}

impl FailureDetector {
    pub fn new() -> Self {
        Self::with_capacity(MAX_INTERVALS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(capacity.min(MAX_INTERVALS)),
            last_time: None,
            capacity,
        }
    }

    /// Records an arrival at `arrival_time`. Accepts zero or negative
    /// intervals as-is (spec.md §4.1 edge cases) — callers SHOULD use a
    /// monotonic clock, but a non-monotonic one is not rejected.
    pub fn add(&mut self, arrival_time: f64) {
        let interval = match self.last_time {
            Some(last) => arrival_time - last,
            None => SEED_INTERVAL_SECS,
        };

        if self.intervals.len() >= self.capacity {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
        self.last_time = Some(arrival_time);
    }

    /// Arithmetic mean of recorded intervals; `None` before the first `add`.
    pub fn interval_mean(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        Some(self.intervals.iter().sum::<f64>() / self.intervals.len() as f64)
    }

    /// True once the elapsed silence since the last arrival makes the peer
    /// suspect at suspicion level `phi`. A peer that has never sent a
    /// heartbeat, or whose mean interval has degenerated to zero, is always
    /// suspected.
    pub fn failed(&self, now: f64, phi: f64) -> bool {
        let last_time = match self.last_time {
            Some(t) => t,
            None => return true,
        };
        let mean = match self.interval_mean() {
            Some(m) if m > 0.0 => m,
            _ => return true,
        };

        let elapsed = now - last_time;
        (-elapsed / mean).exp() < 10f64.powf(-phi)
    }
}

impl Default for FailureDetector {
    fn default() -> Self {
        Self::new()
    }
}
