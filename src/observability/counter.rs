//! Per-second rate counters.
//!
//! A [`RateCounter`] counts events in the current wall-clock second. The first
//! event of a new second flushes the previous window: it is logged, mirrored
//! into the metrics facade, sent to the optional sink and handed to the
//! optional [`TickObserver`], after which the window restarts at 1.
//!
//! Counters are safe to share between workers. The window start and its count
//! live in one atomic word, so each event lands in exactly one window and
//! exactly one caller flushes each window.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::observability::metrics;
use crate::observability::statsd::MetricsSink;

/// Hook invoked once per window rollover, before the window resets.
pub trait TickObserver: Send + Sync {
    fn on_tick(&self, counter: &str, previous: u64);
}

impl<F> TickObserver for F
where
    F: Fn(&str, u64) + Send + Sync,
{
    fn on_tick(&self, counter: &str, previous: u64) {
        self(counter, previous)
    }
}

/// Events-per-second counter for one named metric.
pub struct RateCounter {
    name: String,
    /// Current window start (seconds since the epoch, high half) and the
    /// count within it (low half). The window never moves backwards.
    window: AtomicU64,
    /// Lifetime count, kept for summaries.
    total: AtomicU64,
    sink: Option<Arc<dyn MetricsSink>>,
    sample_rate: f32,
    observer: Option<Box<dyn TickObserver>>,
}

impl RateCounter {
    /// Create a counter that only logs its windows.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_start(name, now_secs())
    }

    fn with_start(name: impl Into<String>, start: u64) -> Self {
        Self {
            name: name.into(),
            window: AtomicU64::new(pack(start, 0)),
            total: AtomicU64::new(0),
            sink: None,
            sample_rate: 1.0,
            observer: None,
        }
    }

    /// Emit flushed windows to `sink`.
    pub fn with_sink(mut self, sink: Option<Arc<dyn MetricsSink>>) -> Self {
        self.sink = sink;
        self
    }

    /// Sample rate passed to the sink on every flush.
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate.clamp(0.0, 1.0);
        self
    }

    /// Attach the per-tick observer.
    pub fn with_observer(mut self, observer: impl TickObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Count one event now.
    pub fn count(&self) {
        self.count_at(now_secs());
    }

    /// Count one event observed at `now` (seconds since the epoch).
    pub fn count_at(&self, now: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut current = self.window.load(Ordering::Acquire);
        loop {
            let (start, value) = unpack(current);
            let (next, flushed) = if now > start {
                (pack(now, 1), Some(value))
            } else {
                (pack(start, value.saturating_add(1).min(COUNT_MASK)), None)
            };
            match self
                .window
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    if let Some(previous) = flushed {
                        self.flush(previous);
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Events counted in the current window.
    pub fn current(&self) -> u64 {
        unpack(self.window.load(Ordering::Acquire)).1
    }

    /// Events counted since construction.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Start of the current window, in seconds since the epoch.
    pub fn window_start(&self) -> u64 {
        unpack(self.window.load(Ordering::Acquire)).0
    }

    fn flush(&self, previous: u64) {
        tracing::info!(
            counter = %self.name,
            per_second = previous,
            "C {}: {} per second",
            self.name,
            previous
        );
        metrics::record_window(&self.name, previous);
        if let Some(sink) = &self.sink {
            sink.incr(&self.name, previous, self.sample_rate);
        }
        if let Some(observer) = &self.observer {
            observer.on_tick(&self.name, previous);
        }
    }
}

impl fmt::Debug for RateCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateCounter")
            .field("name", &self.name)
            .field("current", &self.current())
            .field("total", &self.total())
            .field("window_start", &self.window_start())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

const COUNT_BITS: u32 = 32;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

fn pack(start: u64, value: u64) -> u64 {
    (start << COUNT_BITS) | (value & COUNT_MASK)
}

fn unpack(window: u64) -> (u64, u64) {
    (window >> COUNT_BITS, window & COUNT_MASK)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
