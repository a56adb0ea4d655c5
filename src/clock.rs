//! Monotonic time source shared by the synchronizer and the dispatcher.
//!
//! Sample arrival times, staleness checks and actuation cooldowns are all
//! expressed in seconds on the same monotonic axis. Components receive an
//! `Arc<dyn Clock>` at construction so tests and replays can drive time by hand.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

/// Origin of every [`MonotonicClock`] in the process.
static PROCESS_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// A monotonic clock reporting seconds since an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-independent clock backed by `Instant`.
///
/// All instances count from one process-wide origin, so a listener that builds
/// its own clock stamps samples on the same axis as the pipeline.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: *PROCESS_ORIGIN.get_or_init(Instant::now),
        }
    }

    /// Create a shared handle to a fresh monotonic clock.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to. Used for replays and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, secs: f64) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = secs;
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(10.0);
        assert_eq!(clock.now(), 10.0);

        clock.advance(1.5);
        assert_eq!(clock.now(), 11.5);

        clock.set(3.0);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_monotonic_clocks_share_one_axis() {
        let early = MonotonicClock::new();
        std::thread::sleep(std::time::Duration::from_millis(30));
        let late = MonotonicClock::new();

        let (a, b) = (early.now(), late.now());
        assert!((a - b).abs() < 0.01, "early={a} late={b}");
        assert!(b >= 0.03);
    }
}
