//! Time sources for lease deadlines
//!
//! Leases never read wall-clock time directly. `SystemClock` is the
//! production source; `ManualClock` only moves when told to, which makes
//! expiry deterministic in tests.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source, measured from an arbitrary fixed origin
pub trait Clock: Send + Sync + fmt::Debug {
    /// Elapsed time since the clock's origin
    fn now(&self) -> Duration;
}

/// Clock backed by `std::time::Instant`
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that advances only through `advance`
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}
