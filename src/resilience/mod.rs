//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Frame leaving the queue:
//!     → rate_limit.rs (optional global requests/second ceiling)
//!     → timeouts.rs (deadline on connect and on request/response)
//!     → on failure the worker discards its connection and reconnects
//!       on the next frame
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - No retries: replayed traffic is best-effort, a failed frame is lost
//! - Throttling skips frames instead of delaying them

pub mod rate_limit;
pub mod timeouts;
