//! Shared counters and sink handle.
//!
//! One [`Telemetry`] is built at startup and handed to the listener and every
//! worker, so there is no process-wide metrics state.

use std::sync::Arc;

use dashmap::DashMap;

use crate::observability::counter::{RateCounter, TickObserver};
use crate::observability::metrics;
use crate::observability::statsd::MetricsSink;
use crate::replay::queue::QueueDepth;

/// Sink sample rate for per-status error counters.
pub const STATUS_SAMPLE_RATE: f32 = 0.1;

/// Reports the queue depth every time the `input` counter rolls over.
pub struct BacklogGauge {
    depth: QueueDepth,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl BacklogGauge {
    pub fn new(depth: QueueDepth, sink: Option<Arc<dyn MetricsSink>>) -> Self {
        Self { depth, sink }
    }
}

impl TickObserver for BacklogGauge {
    fn on_tick(&self, _counter: &str, _previous: u64) {
        let depth = self.depth.get();
        tracing::info!(backlog = depth, "Backlog size {}", depth);
        metrics::record_backlog(depth);
        if let Some(sink) = &self.sink {
            sink.gauge("backlog", depth as u64);
        }
    }
}

/// Pipeline counters plus the optional external sink.
pub struct Telemetry {
    sink: Option<Arc<dyn MetricsSink>>,
    /// Frames read from the transport.
    pub input: RateCounter,
    /// Admission attempts refused because the backlog was saturated.
    pub dropped: RateCounter,
    /// Requests that got a response from the upstream.
    pub output: RateCounter,
    /// Frames that could not be parsed.
    pub parse_errors: RateCounter,
    /// Frames skipped by the replay rate limit.
    pub rate_limited: RateCounter,
    /// Upstream I/O failures and timeouts.
    pub upstream_errors: RateCounter,
    status: DashMap<u16, RateCounter>,
}

impl Telemetry {
    pub fn new(sink: Option<Arc<dyn MetricsSink>>, backlog: QueueDepth) -> Self {
        let counter = |name: &str| RateCounter::new(name).with_sink(sink.clone());
        Self {
            input: counter("input").with_observer(BacklogGauge::new(backlog, sink.clone())),
            dropped: counter("dropped"),
            output: counter("worker_output"),
            parse_errors: counter("parse_errors"),
            rate_limited: counter("rate_limited"),
            upstream_errors: counter("upstream_errors"),
            status: DashMap::new(),
            sink,
        }
    }

    /// Telemetry that only logs, for tests and dry runs.
    pub fn detached() -> Self {
        Self::new(None, QueueDepth::default())
    }

    /// Count one upstream response with an error status.
    pub fn count_status(&self, status: u16) {
        if let Some(counter) = self.status.get(&status) {
            counter.count();
            return;
        }
        self.status
            .entry(status)
            .or_insert_with(|| {
                RateCounter::new(format!("status_{status}"))
                    .with_sink(self.sink.clone())
                    .with_sample_rate(STATUS_SAMPLE_RATE)
            })
            .count();
    }

    /// Lifetime count for one status code.
    pub fn status_total(&self, status: u16) -> u64 {
        self.status.get(&status).map(|c| c.total()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            input: self.input.total(),
            dropped: self.dropped.total(),
            forwarded: self.output.total(),
            parse_errors: self.parse_errors.total(),
            rate_limited: self.rate_limited.total(),
            upstream_errors: self.upstream_errors.total(),
            error_statuses: self.status.iter().map(|entry| entry.total()).sum(),
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("sink", &self.sink.is_some())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Lifetime totals of every pipeline counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub input: u64,
    pub dropped: u64,
    pub forwarded: u64,
    pub parse_errors: u64,
    pub rate_limited: u64,
    pub upstream_errors: u64,
    pub error_statuses: u64,
}
