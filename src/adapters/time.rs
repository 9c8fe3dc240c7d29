//! Monotonic clock for the host runner.
//!
//! The engine runs on microseconds since start. Feature vectors read from
//! stdin are restamped with this clock on arrival so that freshness is
//! judged on one timeline.

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Microseconds since the clock was created.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Seconds since the clock was created.
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}
