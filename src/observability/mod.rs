//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener / workers
//!     → telemetry.rs (shared named counters, one context per process)
//!     → counter.rs (per-second windows, rollover once per second)
//!         → logging.rs (one structured log line per window)
//!         → metrics.rs (metrics facade, optional Prometheus scrape)
//!         → statsd.rs (fire-and-forget UDP sink)
//!         → tick observer (backlog gauge on the input counter)
//! ```
//!
//! # Design Decisions
//! - Counting is an atomic increment; all reporting happens on rollover
//! - Sink failures are swallowed, the counting path never blocks
//! - Error-status counters are sampled 1-in-10 on the sink

pub mod counter;
pub mod logging;
pub mod metrics;
pub mod statsd;
pub mod telemetry;

pub use counter::{RateCounter, TickObserver};
pub use statsd::{MetricsSink, StatsdSink};
pub use telemetry::{Telemetry, TelemetrySnapshot};
