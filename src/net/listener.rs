//! Ingress listener on the local datagram transport.
//!
//! # Responsibilities
//! - Bind the unix datagram socket the capture agent writes to
//! - Receive one captured request per datagram
//! - Amplify or sample each frame and admit the copies into the backlog
//! - Stop for good when the peer disconnects
//!
//! # States
//! ```text
//! Running ──(zero-length datagram / receive error)──▶ Stopped
//! ```
//! `Stopped` is terminal: the listener never re-binds. Dropping it drops the
//! queue sender, which lets the workers drain what is left and exit.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::UnixDatagram;
use tokio::sync::broadcast;

use crate::lifecycle::shutdown::ShutdownReason;
use crate::observability::Telemetry;
use crate::replay::amplify;
use crate::replay::queue::{Admission, AdmissionPolicy, FrameSender, RawFrame, MAX_FRAME_LEN};

/// Error type for listener setup.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to remove a stale socket file.
    #[error("failed to remove stale socket {path}: {source}")]
    Stale {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to bind to the socket path.
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Listener lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Running,
    Stopped,
}

/// Amplification and admission for frames coming off the transport.
pub struct FrameIntake {
    queue: FrameSender,
    policy: AdmissionPolicy,
    multiplier: f64,
    rng: StdRng,
    telemetry: Arc<Telemetry>,
}

impl FrameIntake {
    pub fn new(
        queue: FrameSender,
        policy: AdmissionPolicy,
        multiplier: f64,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self::with_rng(queue, policy, multiplier, telemetry, StdRng::from_entropy())
    }

    pub fn with_rng(
        queue: FrameSender,
        policy: AdmissionPolicy,
        multiplier: f64,
        telemetry: Arc<Telemetry>,
        rng: StdRng,
    ) -> Self {
        Self {
            queue,
            policy,
            multiplier,
            rng,
            telemetry,
        }
    }

    /// Count one input frame and make its admission attempts.
    ///
    /// Returns how many copies were enqueued.
    pub fn ingest(&mut self, frame: RawFrame) -> usize {
        self.telemetry.input.count();

        let attempts = amplify::attempts(self.multiplier, &mut self.rng);
        let mut admitted = 0;
        for _ in 0..attempts {
            match self.policy.admit(&self.queue, frame.clone()) {
                Admission::Admitted => admitted += 1,
                Admission::Dropped => self.telemetry.dropped.count(),
            }
        }
        admitted
    }

    pub fn queue(&self) -> &FrameSender {
        &self.queue
    }
}

/// Reads captured frames from a unix datagram socket.
pub struct IngressListener {
    socket: UnixDatagram,
    path: Option<PathBuf>,
    state: ListenerState,
    buf: Vec<u8>,
}

impl IngressListener {
    /// Bind `path`, replacing a socket file left behind by a previous run.
    pub fn bind(path: &Path) -> Result<Self, ListenerError> {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ListenerError::Stale {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }

        let socket = UnixDatagram::bind(path).map_err(|source| ListenerError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Listener bound");

        let mut listener = Self::from_socket(socket);
        listener.path = Some(path.to_path_buf());
        Ok(listener)
    }

    /// Wrap an already connected or bound socket.
    pub fn from_socket(socket: UnixDatagram) -> Self {
        Self {
            socket,
            path: None,
            state: ListenerState::Running,
            buf: vec![0; MAX_FRAME_LEN],
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Receive the next frame, or `None` once the listener has stopped.
    pub async fn next_frame(&mut self) -> Option<RawFrame> {
        if self.state == ListenerState::Stopped {
            return None;
        }
        match self.socket.recv(&mut self.buf).await {
            Ok(0) => {
                tracing::warn!("Listener got empty packet, assuming disconnect");
                self.state = ListenerState::Stopped;
                None
            }
            Ok(n) => Some(Bytes::copy_from_slice(&self.buf[..n])),
            Err(e) => {
                tracing::error!(error = %e, "Listener receive failed, stopping");
                self.state = ListenerState::Stopped;
                None
            }
        }
    }

    /// Feed frames into `intake` until disconnect or shutdown.
    pub async fn run(
        mut self,
        mut intake: FrameIntake,
        mut shutdown: broadcast::Receiver<ShutdownReason>,
    ) {
        tracing::info!(
            len_limit = intake.policy.len_limit(),
            multiplier = intake.multiplier,
            "Listener started"
        );

        while self.state == ListenerState::Running {
            tokio::select! {
                reason = shutdown.recv() => {
                    tracing::info!(reason = ?reason.ok(), "Listener cancelled");
                    self.state = ListenerState::Stopped;
                }
                frame = self.next_frame() => {
                    let Some(frame) = frame else { continue };
                    tracing::debug!(len = frame.len(), "Listener got frame");
                    intake.ingest(frame);
                }
            }
        }

        tracing::info!(backlog = intake.queue().len(), "Listener stopped");
    }
}

impl Drop for IngressListener {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = std::fs::remove_file(path);
        }
    }
}
