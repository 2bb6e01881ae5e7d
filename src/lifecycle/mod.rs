//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → sinks → queue → workers → listener
//!
//! Shutdown (shutdown.rs):
//!     Listener disconnect → queue sender dropped → workers drain → exit
//!     Signal → broadcast → listener and workers stop immediately
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ShutdownReason::Signal
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then the listener
//! - Every per-frame failure is recovered locally; only these paths end a run

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownReason};
pub use startup::{run, RunSummary, StartupError};
