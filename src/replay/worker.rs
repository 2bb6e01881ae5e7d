//! Replay workers.
//!
//! # Responsibilities
//! - Take frames off the backlog in FIFO order
//! - Parse and rewrite them into upstream requests
//! - Forward over a worker-owned keep-alive connection
//! - Count outcomes; never let one bad frame or failed call stop the worker
//!
//! # Per-frame flow
//! ```text
//! pop ─▶ parse ──err──▶ parse_errors
//!          │
//!          ├─ only_get && !GET ─▶ skipped silently
//!          ▼
//!       rate limit ──over──▶ rate_limited
//!          ▼
//!       connection? ──connect fails──▶ upstream_errors, retry on next frame
//!          ▼
//!       send ──I/O error / timeout──▶ upstream_errors, connection dropped
//!          ▼
//!       worker_output (+ status_<code> for 4xx/5xx)
//! ```

use std::sync::Arc;

use hyper::StatusCode;
use tokio::sync::broadcast;

use crate::config::Upstream;
use crate::lifecycle::shutdown::ShutdownReason;
use crate::net::upstream::UpstreamConnection;
use crate::observability::Telemetry;
use crate::replay::frame::{Prepared, RewriteRules};
use crate::replay::queue::{FrameReceiver, RawFrame};
use crate::resilience::rate_limit::ReplayLimiter;
use crate::resilience::timeouts::Deadlines;

/// Settings shared by every worker in the pool.
#[derive(Debug)]
pub struct WorkerSettings {
    pub upstream: Upstream,
    pub rewrite: RewriteRules,
    pub deadlines: Deadlines,
    pub limiter: Option<ReplayLimiter>,
}

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The upstream answered with this status.
    Forwarded(StatusCode),
    /// Excluded by the only-GET filter.
    Filtered,
    /// The frame could not be parsed.
    ParseError,
    /// Skipped by the replay rate limit.
    RateLimited,
    /// No connection could be established.
    Unavailable,
    /// The request or response failed; the connection was discarded.
    Failed,
}

/// One replay worker with its own upstream connection.
pub struct ReplayWorker {
    id: usize,
    settings: Arc<WorkerSettings>,
    telemetry: Arc<Telemetry>,
    connection: Option<UpstreamConnection>,
}

impl ReplayWorker {
    pub fn new(id: usize, settings: Arc<WorkerSettings>, telemetry: Arc<Telemetry>) -> Self {
        Self {
            id,
            settings,
            telemetry,
            connection: None,
        }
    }

    /// Whether a live connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Pop and replay frames until the queue closes or shutdown is signalled.
    ///
    /// Returns the number of frames handled.
    pub async fn run(
        mut self,
        queue: FrameReceiver,
        mut shutdown: broadcast::Receiver<ShutdownReason>,
    ) -> u64 {
        tracing::info!(worker = self.id, "Worker {} started", self.id);
        let mut handled = 0u64;

        loop {
            let frame = tokio::select! {
                biased;
                reason = shutdown.recv() => {
                    tracing::info!(worker = self.id, reason = ?reason.ok(), "Worker cancelled");
                    break;
                }
                frame = queue.pop() => match frame {
                    Some(frame) => frame,
                    None => {
                        tracing::info!(worker = self.id, "Backlog drained, worker exiting");
                        break;
                    }
                },
            };

            self.handle(frame).await;
            handled += 1;
        }

        handled
    }

    /// Replay one frame.
    pub async fn handle(&mut self, frame: RawFrame) -> Outcome {
        let request = match self.settings.rewrite.prepare(&frame) {
            Ok(Prepared::Forward(request)) => request,
            Ok(Prepared::Filtered) => return Outcome::Filtered,
            Err(e) => {
                tracing::debug!(
                    worker = self.id,
                    error = %e,
                    frame = %String::from_utf8_lossy(&frame),
                    "Error while parsing request"
                );
                self.telemetry.parse_errors.count();
                return Outcome::ParseError;
            }
        };
        tracing::debug!(
            worker = self.id,
            method = %request.method,
            uri = %request.uri,
            "Replaying request"
        );

        if let Some(limiter) = &self.settings.limiter {
            if !limiter.try_acquire() {
                self.telemetry.rate_limited.count();
                return Outcome::RateLimited;
            }
        }

        let limit = self.settings.deadlines.request;
        let Some(connection) = self.ensure_connection().await else {
            return Outcome::Unavailable;
        };
        let connection_id = connection.id();

        match connection.send(request, limit).await {
            Ok(status) => {
                self.telemetry.output.count();
                if status.is_client_error() || status.is_server_error() {
                    tracing::debug!(
                        worker = self.id,
                        status = status.as_u16(),
                        "Upstream returned error status"
                    );
                    self.telemetry.count_status(status.as_u16());
                }
                Outcome::Forwarded(status)
            }
            Err(e) => {
                tracing::debug!(
                    worker = self.id,
                    connection_id = %connection_id,
                    error = %e,
                    "Upstream request failed, dropping connection"
                );
                self.telemetry.upstream_errors.count();
                self.connection = None;
                Outcome::Failed
            }
        }
    }

    /// Return the live connection, connecting first if there is none.
    async fn ensure_connection(&mut self) -> Option<&mut UpstreamConnection> {
        if self.connection.as_ref().is_some_and(UpstreamConnection::is_closed) {
            tracing::debug!(worker = self.id, "Upstream closed the connection");
            self.connection = None;
        }

        if self.connection.is_none() {
            let settings = &self.settings;
            match UpstreamConnection::connect(&settings.upstream, &settings.deadlines).await {
                Ok(connection) => self.connection = Some(connection),
                Err(e) => {
                    tracing::debug!(
                        worker = self.id,
                        upstream = %self.settings.upstream,
                        error = %e,
                        "Could not connect to upstream"
                    );
                    self.telemetry.upstream_errors.count();
                    return None;
                }
            }
        }

        self.connection.as_mut()
    }
}
