//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration into running tasks
//! - Initialize subsystems in dependency order: sinks, queue, workers, listener
//! - Wait for the listener to stop and the workers to drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Workers start before the listener so the first frames find a consumer
//! - Listener disconnect drains the backlog; a signal abandons it

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::{ReplayConfig, Upstream};
use crate::config::schema::UpstreamAddressError;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::listener::{FrameIntake, IngressListener, ListenerError};
use crate::observability::statsd::{MetricsSink, StatsdError, StatsdSink};
use crate::observability::{metrics, Telemetry, TelemetrySnapshot};
use crate::replay::frame::RewriteRules;
use crate::replay::queue::{frame_queue, AdmissionPolicy};
use crate::replay::worker::{ReplayWorker, WorkerSettings};
use crate::resilience::rate_limit::ReplayLimiter;
use crate::resilience::timeouts::Deadlines;

/// Fatal errors while bringing the pipeline up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("upstream address: {0}")]
    Upstream(#[from] UpstreamAddressError),
    #[error(transparent)]
    Statsd(#[from] StatsdError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Totals reported once the pipeline has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub counters: TelemetrySnapshot,
    /// Frames taken off the queue by all workers.
    pub frames_handled: u64,
    /// Frames still queued when the workers stopped.
    pub abandoned: usize,
}

/// Build the worker settings shared by the pool.
pub fn worker_settings(config: &ReplayConfig) -> Result<WorkerSettings, UpstreamAddressError> {
    let upstream = Upstream::parse(&config.upstream.address)?;
    Ok(WorkerSettings {
        rewrite: RewriteRules {
            only_get: config.upstream.only_get,
            location_prefix: config.upstream.location_prefix.clone(),
            upstream_host: upstream.authority(),
            host_header: config.upstream.host_header.clone(),
        },
        upstream,
        deadlines: Deadlines::from(&config.timeouts),
        limiter: ReplayLimiter::new(config.upstream.rate_limit),
    })
}

/// Run the pipeline until the capture agent disconnects or `shutdown` fires.
pub async fn run(config: ReplayConfig, shutdown: Shutdown) -> Result<RunSummary, StartupError> {
    let settings = Arc::new(worker_settings(&config)?);

    let sink: Option<Arc<dyn MetricsSink>> = match &config.observability.statsd {
        Some(addr) => Some(Arc::new(
            StatsdSink::connect(addr, &config.observability.statsd_prefix).await?,
        )),
        None => None,
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start Prometheus exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (sender, receiver) = frame_queue(config.backlog.capacity);
    let telemetry = Arc::new(Telemetry::new(sink, sender.depth()));
    let listener = IngressListener::bind(Path::new(&config.transport.unix_socket))?;

    tracing::info!(
        upstream = %settings.upstream,
        workers = config.upstream.threads,
        backlog = config.backlog.capacity,
        len_limit = config.backlog.len_limit(),
        "Spawning workers"
    );
    let mut workers = JoinSet::new();
    for id in 0..config.upstream.threads {
        let worker = ReplayWorker::new(id, settings.clone(), telemetry.clone());
        workers.spawn(worker.run(receiver.clone(), shutdown.subscribe()));
    }

    let intake = FrameIntake::new(
        sender,
        AdmissionPolicy::new(&config.backlog),
        config.traffic.multiplier,
        telemetry.clone(),
    );
    let listener_task = tokio::spawn(listener.run(intake, shutdown.subscribe()));
    if let Err(e) = listener_task.await {
        tracing::error!(error = %e, "Listener task failed");
    }

    tracing::info!(backlog = receiver.len(), "Ingestion finished, draining backlog");
    let mut frames_handled = 0;
    while let Some(result) = workers.join_next().await {
        match result {
            Ok(handled) => frames_handled += handled,
            Err(e) => tracing::error!(error = %e, "Worker task failed"),
        }
    }

    let summary = RunSummary {
        counters: telemetry.snapshot(),
        frames_handled,
        abandoned: receiver.len(),
    };
    tracing::info!(?summary, "Replay finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut config = ReplayConfig::default();
        config.upstream.address = "canary:8081".into();
        config.upstream.only_get = true;
        config.upstream.location_prefix = Some("/v2".into());
        config.upstream.rate_limit = 10;

        let settings = worker_settings(&config).unwrap();
        assert_eq!(settings.upstream.port, 8081);
        assert_eq!(settings.rewrite.upstream_host, "canary:8081");
        assert!(settings.rewrite.only_get);
        assert_eq!(settings.rewrite.location_prefix.as_deref(), Some("/v2"));
        assert!(settings.limiter.is_some());
    }

    #[test]
    fn unlimited_by_default() {
        let settings = worker_settings(&ReplayConfig::default()).unwrap();
        assert!(settings.limiter.is_none());
        assert_eq!(settings.rewrite.upstream_host, "localhost:8080");
    }
}
