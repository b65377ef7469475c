//! Fixed-window request counters.

use std::time::{Duration, Instant};

/// Counts hits within a fixed window; the count resets when the window
/// expires.
#[derive(Debug, Clone)]
pub struct RateWindow {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl RateWindow {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            window,
        }
    }

    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.window {
            self.count = 0;
            self.window_start = now;
        }
    }

    /// Record one hit and return the count in the current window.
    pub fn hit(&mut self, now: Instant) -> u32 {
        self.roll(now);
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Count in the current window without recording a hit.
    pub fn current(&mut self, now: Instant) -> u32 {
        self.roll(now);
        self.count
    }

    /// Time until the current window rolls over.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.window
            .saturating_sub(now.duration_since(self.window_start))
    }
}
