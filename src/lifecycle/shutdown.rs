//! Graceful stop of the gateway.
//!
//! The signal listener fires the trigger once; the HTTP server holds a
//! receiver and stops accepting connections when it fires, then drains
//! in-flight inspections.

use tokio::sync::broadcast;

/// One-shot stop notice fanned out to every listener task.
///
/// Clones share the same channel, so any clone may trigger it.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Receiver that resolves once the gateway starts stopping.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tell every receiver to stop. Without receivers nothing happens.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Receivers that have not been dropped yet.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
