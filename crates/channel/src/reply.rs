// SPDX-License-Identifier: Apache-2.0

//! One-shot reply channels paired with mailbox events.
//!
//! Every request the actor accepts (receive, batch-receive, ack, seek, ...) carries a
//! [`ReplySender`] that the actor completes exactly once. Reply channels are never reused.

use crate::error::ReplyCanceled;

/// The actor-side half: completes the caller's pending request.
pub struct ReplySender<T> {
    inner: tokio::sync::oneshot::Sender<T>,
}

impl<T> ReplySender<T> {
    /// Completes the reply. Best-effort: if the caller already dropped its receiver (e.g. the
    /// request was cancelled), the value is silently discarded.
    pub fn send(self, value: T) {
        let _ = self.inner.send(value);
    }
}

/// The caller-side half: awaits the actor's reply.
pub struct ReplyReceiver<T> {
    inner: tokio::sync::oneshot::Receiver<T>,
}

impl<T> ReplyReceiver<T> {
    /// Awaits the reply. Fails if the actor dropped the [`ReplySender`] without completing it,
    /// which only happens when the actor itself is tearing down.
    pub async fn recv(self) -> Result<T, ReplyCanceled> {
        self.inner.await.map_err(|_| ReplyCanceled)
    }
}

/// Creates a paired reply sender/receiver for a single request.
#[must_use]
pub fn reply_channel<T>() -> (ReplySender<T>, ReplyReceiver<T>) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    (ReplySender { inner: tx }, ReplyReceiver { inner: rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_round_trips() {
        let (tx, rx) = reply_channel::<u32>();
        tx.send(42);
        assert_eq!(rx.recv().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn dropped_sender_cancels_receiver() {
        let (tx, rx) = reply_channel::<u32>();
        drop(tx);
        assert!(rx.recv().await.is_err());
    }
}
