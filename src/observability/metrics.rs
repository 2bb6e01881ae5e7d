//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Mirror rate-counter flushes into the `metrics` facade
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `replay_events_total` (counter): events by `counter` label
//!   (`input`, `dropped`, `worker_output`, `parse_errors`, `status_503`, ...)
//! - `replay_backlog_depth` (gauge): frames waiting in the handoff queue
//!
//! # Design Decisions
//! - Facade updates happen once per counter window, not per event
//! - The exporter is optional; without it the facade calls are no-ops

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const EVENTS_TOTAL: &str = "replay_events_total";
pub const BACKLOG_DEPTH: &str = "replay_backlog_depth";

/// Initialize the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Record a flushed counter window.
pub fn record_window(counter: &str, events: u64) {
    metrics::counter!(EVENTS_TOTAL, "counter" => counter.to_string()).increment(events);
}

/// Record the current backlog depth.
pub fn record_backlog(depth: usize) {
    metrics::gauge!(BACKLOG_DEPTH).set(depth as f64);
}
