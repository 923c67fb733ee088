//! Stage-owned channels with single-owner close semantics.
//!
//! A channel is created by the stage that writes to it. That stage keeps the
//! [`StageSender`] and hands out [`StageReceiver`] views. Closing consumes the sender, so a
//! channel can be closed at most once and nothing can be sent after it was closed. Readers
//! have no way to close a channel at all.

use std::fmt;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use crate::concurrency::cancel::CancelRx;

/// Result of a send raced against cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The value was accepted by the channel.
    Delivered,
    /// Cancellation fired before the channel accepted the value.
    Cancelled,
    /// Every receiver was dropped, nobody will ever read the value.
    Disconnected,
}

/// Result of a receive raced against cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<T> {
    /// A value was taken from the channel.
    Value(T),
    /// The channel is closed and fully drained.
    Closed,
    /// Cancellation fired before a value became available.
    Cancelled,
}

/// Creates a new stage channel holding up to `capacity` in-flight values.
///
/// A capacity of zero is raised to one since bounded tokio channels need at least one slot.
pub fn stage_channel<T>(capacity: usize) -> (StageSender<T>, StageReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    (
        StageSender { tx },
        StageReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Sends `value` on `tx` unless cancellation fires first.
///
/// The select is biased towards cancellation so that an already triggered signal wins even
/// when the channel has room. A receiver may observe cancellation and go away before the
/// signal wakes this task, so a failed send is reported as cancelled once the signal is set.
async fn send_or_cancel<T>(tx: &mpsc::Sender<T>, value: T, cancel_rx: &mut CancelRx) -> SendOutcome {
    let outcome = tokio::select! {
        biased;

        _ = cancel_rx.cancelled() => SendOutcome::Cancelled,
        result = tx.send(value) => match result {
            Ok(()) => SendOutcome::Delivered,
            Err(_) => SendOutcome::Disconnected,
        },
    };

    if outcome == SendOutcome::Disconnected && cancel_rx.is_cancelled() {
        return SendOutcome::Cancelled;
    }

    outcome
}

/// Write side of a stage channel, held only by the stage that created it.
pub struct StageSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> StageSender<T> {
    /// Sends `value`, suspending until the receiver side has room or cancellation fires.
    pub async fn send(&self, value: T, cancel_rx: &mut CancelRx) -> SendOutcome {
        send_or_cancel(&self.tx, value, cancel_rx).await
    }

    /// Closes the channel.
    ///
    /// Readers drain the values already sent and then observe the end of the channel.
    pub fn close(self) {
        trace!("closing stage channel");
        drop(self.tx);
    }

    /// Creates a send-only view for a helper task of the owning stage.
    ///
    /// A [`Relay`] cannot close the channel; the channel only closes once the owner called
    /// [`StageSender::close`] and every relay was dropped, so the owner must outlive its
    /// relays for the close to happen where it expects.
    pub(crate) fn relay(&self) -> Relay<T> {
        Relay {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for StageSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Send-only view of a channel owned by another task of the same stage.
pub(crate) struct Relay<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Relay<T> {
    /// Same as [`StageSender::send`].
    pub(crate) async fn send(&self, value: T, cancel_rx: &mut CancelRx) -> SendOutcome {
        send_or_cancel(&self.tx, value, cancel_rx).await
    }
}

/// Read side of a stage channel.
///
/// Clones share the same queue: each value is received by exactly one clone, which is how
/// several transform stages split the output of a single upstream stage.
pub struct StageReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> StageReceiver<T> {
    /// Receives the next value, or `None` once the channel is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Receives the next value unless cancellation fires first.
    ///
    /// A channel closed by an upstream stage that stopped on cancellation is reported as
    /// [`Received::Cancelled`].
    pub async fn recv_or_cancel(&self, cancel_rx: &mut CancelRx) -> Received<T> {
        let received = tokio::select! {
            biased;

            _ = cancel_rx.cancelled() => Received::Cancelled,
            value = self.recv() => match value {
                Some(value) => Received::Value(value),
                None => Received::Closed,
            },
        };

        if matches!(received, Received::Closed) && cancel_rx.is_cancelled() {
            return Received::Cancelled;
        }

        received
    }

    /// Turns this view into a [`Stream`] that ends when the channel is closed.
    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |rx| async move {
            let value = rx.recv().await?;
            Some((value, rx))
        })
    }
}

impl<T> Clone for StageReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> fmt::Debug for StageReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageReceiver")
            .field("views", &Arc::strong_count(&self.rx))
            .finish()
    }
}
