// SPDX-License-Identifier: Apache-2.0

//! A thin, typed wrapper around [`tokio::sync::mpsc`] used for actor mailboxes.
//!
//! The multi-topic consumer core is a single-consumer actor: many producers (the public
//! handle, the poller, watchers, timers) hold a [`Sender`] and post events; exactly one task
//! holds the matching [`Receiver`] and drains it in arrival order.

use crate::error::{RecvError, SendError};

/// The sending half of an actor mailbox.
///
/// Cloning a `Sender` increments the underlying channel's producer count; the channel only
/// closes once every clone (and the original) has been dropped.
pub struct Sender<T> {
    inner: tokio::sync::mpsc::Sender<T>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Sender<T> {
    /// Sends a message, waiting for mailbox capacity if necessary.
    pub async fn send(&self, msg: T) -> Result<(), SendError<T>> {
        self.inner
            .send(msg)
            .await
            .map_err(|e| SendError::Closed(e.0))
    }

    /// Attempts to send a message without waiting.
    pub fn try_send(&self, msg: T) -> Result<(), SendError<T>> {
        self.inner.try_send(msg).map_err(|e| match e {
            tokio::sync::mpsc::error::TrySendError::Full(v) => SendError::Full(v),
            tokio::sync::mpsc::error::TrySendError::Closed(v) => SendError::Closed(v),
        })
    }

    /// Returns `true` if the mailbox has no remaining receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// The receiving half of an actor mailbox. Owned by exactly one task.
pub struct Receiver<T> {
    inner: tokio::sync::mpsc::Receiver<T>,
}

impl<T> Receiver<T> {
    /// Receives the next message, or [`RecvError::Closed`] once every sender has dropped and
    /// the mailbox is drained.
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        self.inner.recv().await.ok_or(RecvError::Closed)
    }

    /// Non-blocking receive; does not distinguish an empty-but-open channel from a closed one
    /// beyond returning `None`/`Err` respectively, since callers that poll always have an
    /// `.await` fallback.
    pub fn try_recv(&mut self) -> Option<T> {
        self.inner.try_recv().ok()
    }
}

/// Creates a new bounded mailbox with the given capacity.
#[must_use]
pub fn mailbox<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (inner_tx, inner_rx) = tokio::sync::mpsc::channel(capacity);
    (Sender { inner: inner_tx }, Receiver { inner: inner_rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_recv_preserves_order() {
        let (tx, mut rx) = mailbox::<u32>(4);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn try_send_reports_full() {
        let (tx, _rx) = mailbox::<u32>(1);
        tx.try_send(1).unwrap();
        assert!(matches!(tx.try_send(2), Err(SendError::Full(2))));
    }

    #[tokio::test]
    async fn recv_reports_closed_once_senders_drop() {
        let (tx, mut rx) = mailbox::<u32>(1);
        drop(tx);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn clone_keeps_channel_open_until_last_drop() {
        let (tx, mut rx) = mailbox::<u32>(1);
        let tx2 = tx.clone();
        drop(tx);
        tx2.send(7).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), 7);
        drop(tx2);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }
}
