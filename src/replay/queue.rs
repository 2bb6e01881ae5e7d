//! Bounded handoff queue between the ingress listener and the workers.
//!
//! # Responsibilities
//! - Fixed-capacity FIFO of raw frames
//! - Non-blocking depth query and non-blocking insert for the producer
//! - Suspending dequeue shared by many consumers
//! - Admission control: drop instead of block once the depth passes
//!   `capacity - breathing_space`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::config::BacklogConfig;

/// Largest datagram the capture agent may send.
pub const MAX_FRAME_LEN: usize = 16 * 1024;

/// One captured HTTP request exactly as transmitted. Immutable once received.
pub type RawFrame = Bytes;

/// Shared view of the queue depth, readable without touching the channel.
///
/// Incremented before a frame is offered and decremented after it is taken,
/// so it never under-reports the number of frames in the channel.
#[derive(Debug, Clone, Default)]
pub struct QueueDepth(Arc<AtomicUsize>);

impl QueueDepth {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn inc(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    fn dec(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Create a queue holding at most `capacity` frames.
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let depth = QueueDepth::default();
    (
        FrameSender {
            tx,
            depth: depth.clone(),
        },
        FrameReceiver {
            rx: Arc::new(Mutex::new(rx)),
            depth,
        },
    )
}

/// Why a frame could not be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The queue already holds `capacity` frames.
    Full,
    /// Every receiver is gone.
    Closed,
}

/// Producer half, owned by the listener.
#[derive(Debug)]
pub struct FrameSender {
    tx: mpsc::Sender<RawFrame>,
    depth: QueueDepth,
}

impl FrameSender {
    /// Insert without waiting.
    pub fn try_push(&self, frame: RawFrame) -> Result<(), PushError> {
        self.depth.inc();
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.depth.dec();
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => PushError::Full,
                    mpsc::error::TrySendError::Closed(_) => PushError::Closed,
                })
            }
        }
    }

    /// Frames currently waiting.
    pub fn len(&self) -> usize {
        self.depth.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self) -> QueueDepth {
        self.depth.clone()
    }
}

/// Consumer half; clone one per worker.
#[derive(Debug, Clone)]
pub struct FrameReceiver {
    rx: Arc<Mutex<mpsc::Receiver<RawFrame>>>,
    depth: QueueDepth,
}

impl FrameReceiver {
    /// Wait for the next frame in FIFO order.
    ///
    /// Returns `None` once the sender is dropped and the queue is drained.
    pub async fn pop(&self) -> Option<RawFrame> {
        let frame = self.rx.lock().await.recv().await?;
        self.depth.dec();
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.depth.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Dropped,
}

/// Drop-instead-of-block admission policy.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    len_limit: usize,
}

impl AdmissionPolicy {
    pub fn new(backlog: &BacklogConfig) -> Self {
        Self {
            len_limit: backlog.len_limit(),
        }
    }

    pub fn len_limit(&self) -> usize {
        self.len_limit
    }

    /// Offer `frame` to the queue, dropping it when the depth exceeds the limit
    /// or the channel itself is full.
    pub fn admit(&self, queue: &FrameSender, frame: RawFrame) -> Admission {
        if queue.len() > self.len_limit {
            return Admission::Dropped;
        }
        match queue.try_push(frame) {
            Ok(()) => Admission::Admitted,
            Err(_) => Admission::Dropped,
        }
    }
}
