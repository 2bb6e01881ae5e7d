//! Shutdown coordination for the replay pipeline.

use tokio::sync::broadcast;

/// Why the pipeline is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT/SIGTERM; tasks stop without draining.
    Signal,
}

/// Coordinator for cancellation.
///
/// Provides a broadcast channel that the listener and every worker subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<ShutdownReason>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.tx.subscribe()
    }

    /// Broadcast `reason` to every subscriber.
    pub fn trigger(&self, reason: ShutdownReason) {
        tracing::info!(
            reason = ?reason,
            subscribers = self.tx.receiver_count(),
            "Shutdown triggered"
        );
        let _ = self.tx.send(reason);
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
