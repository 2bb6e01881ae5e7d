//! Shadow traffic replay engine.
//!
//! Captured HTTP requests arrive as datagrams on a local socket, pass through
//! an amplifying, load-shedding admission step into a bounded queue, and are
//! replayed by a pool of workers against an upstream service.

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod replay;
pub mod resilience;

pub use config::ReplayConfig;
pub use lifecycle::{RunSummary, Shutdown};
