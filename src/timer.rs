//! Monotonic wall-clock timing utility.
//!
//! `std::time::Instant` is already a monotonic clock on every platform Rust
//! targets, so there's no `QueryPerformanceCounter`/`high_resolution_clock`
//! switch to write here.

use std::time::{Duration, Instant};

pub struct HighResTimer {
    reset_time: Instant,
    previous_time: Instant,
}

impl HighResTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        HighResTimer {
            reset_time: now,
            previous_time: now,
        }
    }

    pub fn reset(&mut self) {
        let now = Instant::now();
        self.reset_time = now;
        self.previous_time = now;
    }

    /// Elapsed time since the last `reset`. Also advances `previous`.
    pub fn time_since_reset(&mut self) -> Duration {
        let now = Instant::now();
        self.previous_time = now;
        now.duration_since(self.reset_time)
    }

    /// Elapsed time since the previous call to either timing method.
    pub fn time_since_previous(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.previous_time);
        self.previous_time = now;
        elapsed
    }
}

impl Default for HighResTimer {
    fn default() -> Self {
        Self::new()
    }
}
