//! Monotonic time source shared by the failure detector and the gossip loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Returns the current time, in fractional seconds, from some monotonic
/// epoch that is stable for the lifetime of the clock.
///
/// Both `FailureDetector::add` and `PeerState::check_suspected` must be fed
/// timestamps from the same clock instance, or suspicion math becomes
/// meaningless.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

/// Wraps `std::time::Instant`. This is the clock a `Gossiper` uses unless a
/// test substitutes `FakeClock`.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// A clock the test suite advances by hand, so the properties in spec.md §8
/// (S3 in particular) can be asserted without sleeping real wall-clock time.
pub struct FakeClock {
    // Stored as fixed-point microseconds so advances from multiple threads
    // never race into a torn f64.
    micros: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            micros: AtomicU64::new(0),
        }
    }

    pub fn set(&self, secs: f64) {
        self.micros
            .store((secs * 1_000_000.0) as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        let delta = (secs * 1_000_000.0) as u64;
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_secs(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}
