//! Per-session search quota.
//!
//! Fixed windows: the quota is refilled wholesale once the current window has elapsed, no
//! matter how much of it was used. The caller supplies `now`; instants are tokio's and follow a
//! paused test clock.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SearchLimiter {
    quota: u32,
    window: Duration,
    remaining: u32,
    refill_deadline: Instant,
}

impl SearchLimiter {
    pub fn new(quota: u32, window: Duration, now: Instant) -> Self {
        Self {
            quota,
            window,
            remaining: quota,
            refill_deadline: now + window,
        }
    }

    /// Take one search from the quota. `false` means the caller is over the limit.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if now >= self.refill_deadline {
            self.remaining = self.quota;
            self.refill_deadline = now + self.window;
        }
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn refill_deadline(&self) -> Instant {
        self.refill_deadline
    }
}
