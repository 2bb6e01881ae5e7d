//! Global replay throttle.
//!
//! Caps forwarded requests per second across all workers. Frames over the
//! limit are skipped rather than delayed so the queue keeps draining.

use std::sync::Mutex;
use std::time::Instant;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Requests-per-second ceiling shared by the worker pool.
#[derive(Debug)]
pub struct ReplayLimiter {
    bucket: Mutex<TokenBucket>,
    rps: f64,
}

impl ReplayLimiter {
    /// `None` when `rps` is 0 (unlimited).
    pub fn new(rps: u32) -> Option<Self> {
        (rps > 0).then(|| {
            let rps = f64::from(rps);
            Self {
                bucket: Mutex::new(TokenBucket::new(rps, Instant::now())),
                rps,
            }
        })
    }

    /// Take a slot for one request; `false` means skip the frame.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        // A poisoned bucket only holds a token count; keep using it.
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.try_acquire(self.rps, self.rps, now)
    }
}
