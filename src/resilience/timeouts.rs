//! Timeout enforcement.
//!
//! # Responsibilities
//! - Put a deadline on every upstream connect and request/response exchange
//! - Report an expired deadline as a distinct error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - Callers treat a timeout like any other I/O failure on the connection

use std::future::Future;
use std::time::Duration;

use crate::config::TimeoutConfig;

/// Deadlines for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub connect: Duration,
    pub request: Duration,
}

impl From<&TimeoutConfig> for Deadlines {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            request: Duration::from_secs(config.request_secs),
        }
    }
}

/// The wrapped operation did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{operation} timed out after {limit:?}")]
pub struct Elapsed {
    pub operation: &'static str,
    pub limit: Duration,
}

/// Run `future` with a deadline.
pub async fn with_deadline<F: Future>(
    operation: &'static str,
    limit: Duration,
    future: F,
) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| Elapsed { operation, limit })
}
