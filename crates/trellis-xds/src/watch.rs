//! Change notification for resource caches.
//!
//! Every cache owns a [`Notifier`]; producers bump it after a successful
//! update and any number of consumers block on a [`Changes`] handle. The
//! signal is level triggered and carries no payload - a woken consumer
//! re-reads the cache and sees only the latest state, never a backlog of
//! intermediate versions. Discovery clients always want current truth, so
//! coalescing intermediate updates is correct, not lossy.

use tokio::sync::watch;

/// A broadcast "state changed, re-read" signal. The version counter only
/// exists so waiters can tell a wake from a spurious poll; it is not a
/// resource version and never goes over the wire.
#[derive(Debug)]
pub struct Notifier {
    tx: watch::Sender<u64>,
}

impl Default for Notifier {
    fn default() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }
}

impl Notifier {
    /// Advance the version and wake every subscriber.
    pub fn notify(&self) {
        self.tx.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Subscribe to future changes. The handle starts caught-up: it only
    /// wakes for versions published after this call.
    pub fn changes(&self) -> Changes {
        Changes(self.tx.subscribe())
    }

    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }
}

/// A consumer's subscription to one cache's change signal. Cheap to clone;
/// each clone tracks its own last-seen version.
#[derive(Debug, Clone)]
pub struct Changes(watch::Receiver<u64>);

impl Changes {
    /// Wait until the version advances past the last one this handle
    /// observed, then return it. If the owning cache has been dropped the
    /// process is shutting down; the current version is returned so callers
    /// can fall out of their read loop.
    pub async fn changed(&mut self) -> u64 {
        let _ = self.0.changed().await;
        *self.0.borrow_and_update()
    }

    pub fn version(&self) -> u64 {
        *self.0.borrow()
    }
}
