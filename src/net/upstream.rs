//! Persistent upstream connection.
//!
//! # Responsibilities
//! - Open one HTTP/1.1 keep-alive connection to the replay target
//! - Send a rewritten request, drain the response, report the status
//! - Bound connect and exchange with deadlines
//!
//! Each worker owns at most one [`UpstreamConnection`]. Any error leaves the
//! connection unusable; the worker drops it and connects again on the next
//! frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::body::Body;
use hyper::client::conn::http1;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::config::Upstream;
use crate::replay::frame::ForwardRequest;
use crate::resilience::timeouts::{with_deadline, Deadlines, Elapsed};

/// Relaxed ordering is enough: ids only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an upstream connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upstream-{}", self.0)
    }
}

/// Failures talking to the upstream.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("HTTP handshake failed: {0}")]
    Handshake(#[source] hyper::Error),
    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),
    #[error("reading response body failed: {0}")]
    Body(#[source] axum::Error),
    #[error(transparent)]
    Timeout(#[from] Elapsed),
}

/// One keep-alive HTTP/1.1 connection to the upstream.
#[derive(Debug)]
pub struct UpstreamConnection {
    id: ConnectionId,
    sender: http1::SendRequest<Body>,
}

impl UpstreamConnection {
    /// Connect and perform the HTTP/1.1 handshake within the connect deadline.
    pub async fn connect(
        upstream: &Upstream,
        deadlines: &Deadlines,
    ) -> Result<Self, UpstreamError> {
        let stream = with_deadline(
            "connect",
            deadlines.connect,
            TcpStream::connect((upstream.host.as_str(), upstream.port)),
        )
        .await??;
        stream.set_nodelay(true)?;

        let (sender, connection) = with_deadline(
            "handshake",
            deadlines.connect,
            http1::handshake(TokioIo::new(stream)),
        )
        .await?
        .map_err(UpstreamError::Handshake)?;

        let id = ConnectionId::next();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(
                    connection_id = %id,
                    error = %e,
                    "Upstream connection closed with error"
                );
            }
        });

        tracing::debug!(
            connection_id = %id,
            upstream = %upstream,
            "Upstream connection established"
        );
        Ok(Self { id, sender })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True once the peer or the driver task has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Forward `request` and drain the response within `limit`.
    pub async fn send(
        &mut self,
        request: ForwardRequest,
        limit: Duration,
    ) -> Result<StatusCode, UpstreamError> {
        with_deadline("request", limit, self.exchange(request)).await?
    }

    async fn exchange(&mut self, request: ForwardRequest) -> Result<StatusCode, UpstreamError> {
        self.sender.ready().await.map_err(UpstreamError::Request)?;

        let mut outgoing = Request::new(Body::from(request.body));
        *outgoing.method_mut() = request.method;
        *outgoing.uri_mut() = request.uri;
        *outgoing.headers_mut() = request.headers;

        let response = self
            .sender
            .send_request(outgoing)
            .await
            .map_err(UpstreamError::Request)?;
        let status = response.status();

        // The body must be read to the end for the connection to be reused.
        axum::body::to_bytes(Body::new(response.into_body()), usize::MAX)
            .await
            .map_err(UpstreamError::Body)?;

        Ok(status)
    }
}
