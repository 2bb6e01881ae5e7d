//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! capture agent
//!     → listener.rs (unix datagram socket, one frame per datagram)
//!     → hand off to replay::queue
//!
//! replay worker
//!     → upstream.rs (per-worker keep-alive HTTP/1.1 connection)
//!     → upstream service
//! ```
//!
//! # Design Decisions
//! - The listener owns the only producer handle of the queue
//! - Upstream connections are never shared between workers
//! - Every upstream call carries a deadline

pub mod listener;
pub mod upstream;

pub use listener::{FrameIntake, IngressListener, ListenerError, ListenerState};
pub use upstream::{UpstreamConnection, UpstreamError};
