//! Single-assignment run result.

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Write side of a run's result. The first resolution wins; later ones are
/// no-ops.
#[derive(Debug)]
pub struct RunResultSlot {
    sender: Mutex<Option<oneshot::Sender<Option<String>>>>,
}

/// Read side of a run's result.
#[derive(Debug)]
pub struct RunResultReceiver(oneshot::Receiver<Option<String>>);

impl RunResultSlot {
    /// Create a connected slot and receiver.
    #[must_use]
    pub fn channel() -> (Self, RunResultReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            RunResultReceiver(rx),
        )
    }

    /// Resolve with a value. Returns `false` if already resolved.
    pub fn resolve(&self, value: Option<String>) -> bool {
        match self.claim() {
            Some(sender) => {
                let _ = sender.send(value);
                true
            }
            None => false,
        }
    }

    /// Take the sender, committing this caller as the one resolution.
    ///
    /// Dropping the returned sender resolves the run to `None`.
    pub fn claim(&self) -> Option<oneshot::Sender<Option<String>>> {
        self.sender.lock().take()
    }

    /// Whether the slot has been resolved or claimed.
    pub fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Resolve to `None` unless already resolved.
    pub fn close(&self) {
        let _ = self.resolve(None);
    }
}

impl RunResultReceiver {
    /// Wait for the resolution. A slot dropped unresolved yields `None`.
    pub async fn wait(self) -> Option<String> {
        self.0.await.unwrap_or(None)
    }
}
