// SPDX-License-Identifier: Apache-2.0

//! The incoming message queue and the two waiter registries (single-receive and
//! batch-receive) the Core Actor serializes delivery through.

use crate::error::Result;
use crate::message::{Message, Messages};
use mtc_channel::reply::ReplySender;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// FIFO of delivered-but-not-yet-handed-out results. Tracks the running total of successful
/// payload bytes so the Core never has to re-walk the queue to answer backpressure or
/// batch-readiness questions.
#[derive(Default)]
pub struct IncomingQueue {
    messages: VecDeque<Result<Message>>,
    incoming_bytes: usize,
}

impl IncomingQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries queued (successes and errors alike).
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sum of payload lengths over queued successful entries.
    #[must_use]
    pub fn incoming_bytes(&self) -> usize {
        self.incoming_bytes
    }

    /// Appends an entry to the back of the queue.
    pub fn push(&mut self, entry: Result<Message>) {
        if let Ok(message) = &entry {
            self.incoming_bytes += message.len();
        }
        self.messages.push_back(entry);
    }

    /// Removes and returns the oldest entry, if any.
    pub fn pop(&mut self) -> Option<Result<Message>> {
        let entry = self.messages.pop_front()?;
        if let Ok(message) = &entry {
            self.incoming_bytes -= message.len();
        }
        Some(entry)
    }

    /// Drains up to `limit` entries into a batch, stopping early (without consuming it) at
    /// the first queued error so a subsequent `receive`/`batch_receive` can surface it.
    pub fn drain_batch(&mut self, limit: usize) -> Messages {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.messages.front() {
                Some(Ok(_)) => {
                    let Some(Ok(message)) = self.pop() else {
                        unreachable!("front() just confirmed Ok")
                    };
                    out.push(message);
                }
                _ => break,
            }
        }
        Messages(out)
    }

    /// Clears the queue entirely (used after `Seek`/`RedeliverAll`).
    pub fn clear(&mut self) {
        self.messages.clear();
        self.incoming_bytes = 0;
    }
}

/// A parked single-message receive request.
pub struct Waiter {
    /// Identifies this waiter for `RemoveWaiter`.
    pub id: u64,
    /// Cancellation source the caller supplied; `None` for an uncancellable wait.
    pub cancellation: Option<CancellationToken>,
    /// Where to send the eventual result.
    pub reply: ReplySender<Result<Message>>,
}

/// FIFO registry of parked single-message receive requests.
#[derive(Default)]
pub struct Waiters {
    next_id: u64,
    waiters: VecDeque<Waiter>,
}

impl Waiters {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parked waiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// `true` when no waiter is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Parks a new waiter at the back of the queue, returning its id.
    pub fn register(
        &mut self,
        cancellation: Option<CancellationToken>,
        reply: ReplySender<Result<Message>>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.waiters.push_back(Waiter {
            id,
            cancellation,
            reply,
        });
        id
    }

    /// Removes and returns the oldest waiter, if any.
    pub fn pop_front(&mut self) -> Option<Waiter> {
        self.waiters.pop_front()
    }

    /// Detaches the waiter with the given id, wherever it sits in the queue.
    pub fn remove(&mut self, id: u64) -> Option<Waiter> {
        let index = self.waiters.iter().position(|w| w.id == id)?;
        self.waiters.remove(index)
    }

    /// Drains every parked waiter, in order, for best-effort teardown replies.
    pub fn drain(&mut self) -> Vec<Waiter> {
        self.waiters.drain(..).collect()
    }
}

/// A parked batch-receive request. `cancel` distinguishes "the batch completed" from "the
/// caller cancelled": the scheduled `SendBatchByTimeout` checks it before firing.
pub struct BatchWaiter {
    /// Identifies this waiter for `RemoveBatchWaiter`.
    pub id: u64,
    /// Cancellation source the caller supplied; `None` for an uncancellable wait.
    pub cancellation: Option<CancellationToken>,
    /// Internal token covering the scheduled timeout; cancelled once the waiter is satisfied
    /// by any means so the pending timeout task becomes a no-op.
    pub timeout_guard: CancellationToken,
    /// Where to send the eventual result.
    pub reply: ReplySender<Result<Messages>>,
}

/// FIFO registry of parked batch-receive requests.
#[derive(Default)]
pub struct BatchWaiters {
    next_id: u64,
    waiters: VecDeque<BatchWaiter>,
}

impl BatchWaiters {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parked batch waiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// `true` when no batch waiter is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Parks a new batch waiter at the back of the queue, returning its id and a clone of its
    /// timeout guard token (for the caller to arm the delayed `SendBatchByTimeout`).
    pub fn register(
        &mut self,
        cancellation: Option<CancellationToken>,
        reply: ReplySender<Result<Messages>>,
    ) -> (u64, CancellationToken) {
        let id = self.next_id;
        self.next_id += 1;
        let timeout_guard = CancellationToken::new();
        self.waiters.push_back(BatchWaiter {
            id,
            cancellation,
            timeout_guard: timeout_guard.clone(),
            reply,
        });
        (id, timeout_guard)
    }

    /// Removes and returns the oldest batch waiter, if any.
    pub fn pop_front(&mut self) -> Option<BatchWaiter> {
        self.waiters.pop_front()
    }

    /// Detaches the batch waiter with the given id.
    pub fn remove(&mut self, id: u64) -> Option<BatchWaiter> {
        let index = self.waiters.iter().position(|w| w.id == id)?;
        self.waiters.remove(index)
    }

    /// Drains every parked batch waiter, in order, for best-effort teardown replies.
    pub fn drain(&mut self) -> Vec<BatchWaiter> {
        self.waiters.drain(..).collect()
    }
}
