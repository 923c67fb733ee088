use std::future::pending;

use tokio::sync::watch;

/// Trigger side of the pipeline cancellation signal.
///
/// [`CancelTx`] broadcasts a one-shot stop notification to every [`CancelRx`] subscribed to
/// it. Triggering is idempotent and can never be undone.
#[derive(Debug, Clone)]
pub struct CancelTx(watch::Sender<bool>);

impl CancelTx {
    /// Fires the signal.
    ///
    /// Returns `true` only for the call that performed the transition, later calls are no-ops.
    /// Works whether or not any receiver is still subscribed.
    pub fn trigger(&self) -> bool {
        self.0.send_if_modified(|cancelled| {
            if *cancelled {
                return false;
            }

            *cancelled = true;
            true
        })
    }

    /// Returns `true` once the signal has been triggered.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new observer of this signal.
    pub fn subscribe(&self) -> CancelRx {
        CancelRx(self.0.subscribe())
    }
}

/// Observer side of the pipeline cancellation signal.
///
/// Every stage owns its own clone; observing never consumes the signal for other observers.
#[derive(Debug, Clone)]
pub struct CancelRx(watch::Receiver<bool>);

impl CancelRx {
    /// Returns `true` once the signal has been triggered.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves as soon as the signal is triggered, immediately if it already was.
    ///
    /// Never resolves on its own otherwise, so it is meant to be one branch of a
    /// `tokio::select!`. If every [`CancelTx`] is dropped without triggering, the signal can
    /// no longer fire and this stays pending forever.
    pub async fn cancelled(&mut self) {
        let closed = self.0.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            pending::<()>().await;
        }
    }
}

/// Creates a new, untriggered cancellation signal.
pub fn create_cancel_channel() -> (CancelTx, CancelRx) {
    let (tx, rx) = watch::channel(false);
    (CancelTx(tx), CancelRx(rx))
}
