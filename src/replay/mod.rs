//! Replay pipeline core.
//!
//! # Data Flow
//! ```text
//! net::listener ─▶ amplify.rs (multiplier) ─▶ queue.rs (admission, bounded FIFO)
//!                                                 │
//!                          ┌──────────────────────┼──────────────────────┐
//!                          ▼                      ▼                      ▼
//!                      worker 0               worker 1      ...      worker N-1
//!                          │ frame.rs (parse, rewrite)
//!                          ▼
//!                   net::upstream (one keep-alive connection per worker)
//! ```
//!
//! # Design Decisions
//! - The listener never waits on the queue; saturation drops frames
//! - FIFO into the queue, no ordering across workers
//! - Workers share nothing but the queue and the telemetry counters

pub mod amplify;
pub mod frame;
pub mod queue;
pub mod worker;

pub use frame::{FrameError, ParsedRequest, RewriteRules};
pub use queue::{frame_queue, AdmissionPolicy, FrameReceiver, FrameSender, RawFrame};
pub use worker::{Outcome, ReplayWorker, WorkerSettings};
