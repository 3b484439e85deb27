// SPDX-License-Identifier: Apache-2.0

//! `TaskSeq`: a fair, dynamic-set merge over per-child [`Stream`]s.
//!
//! Keeps exactly one outstanding `next()` per currently-armed child. `next()` on the
//! aggregate returns whichever child future completes first and immediately re-arms that
//! child, never starving the others. Children can be added, removed, or restarted without
//! disturbing the in-flight futures of survivors.

use crate::error::Result;
use crate::message::Message;
use crate::stream::Stream;
use crate::topic::CompleteTopicName;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type PendingFuture = BoxFuture<'static, (CompleteTopicName, Result<Message>)>;

/// The dynamic fan-in merge over the multi-topic consumer's active children.
pub struct TaskSeq {
    children: HashMap<CompleteTopicName, Arc<Stream>>,
    pending: FuturesUnordered<PendingFuture>,
    armed: HashSet<CompleteTopicName>,
}

impl TaskSeq {
    /// An empty merge with no children.
    #[must_use]
    pub fn new() -> Self {
        Self {
            children: HashMap::new(),
            pending: FuturesUnordered::new(),
            armed: HashSet::new(),
        }
    }

    /// Number of children currently tracked (armed or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// `true` when no children are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// `true` when this topic already has a child tracked.
    #[must_use]
    pub fn contains(&self, topic: &CompleteTopicName) -> bool {
        self.children.contains_key(topic)
    }

    /// Adds a new child and immediately arms its first `next()` call.
    pub fn add(&mut self, stream: Arc<Stream>) {
        let topic = stream.topic().clone();
        let _ = self.children.insert(topic.clone(), stream.clone());
        self.arm(topic, stream);
    }

    /// Detaches a child. Its in-flight `next()`, if any, is left to run to completion but its
    /// result is discarded by `next()` rather than ever being delivered.
    pub fn remove(&mut self, topic: &CompleteTopicName) -> Option<Arc<Stream>> {
        let _ = self.armed.remove(topic);
        self.children.remove(topic)
    }

    /// Re-arms every tracked child that currently has no outstanding `next()` call. A no-op
    /// for children that are already armed.
    pub fn restart_completed(&mut self) {
        let to_arm: Vec<_> = self
            .children
            .iter()
            .filter(|(topic, _)| !self.armed.contains(*topic))
            .map(|(topic, stream)| (topic.clone(), stream.clone()))
            .collect();
        for (topic, stream) in to_arm {
            self.arm(topic, stream);
        }
    }

    fn arm(&mut self, topic: CompleteTopicName, stream: Arc<Stream>) {
        if self.armed.insert(topic.clone()) {
            self.pending.push(Box::pin(async move {
                let result = stream.next().await;
                (topic, result)
            }));
        }
    }

    /// Returns the next `(topic, result)` pair from whichever armed child completes first,
    /// re-arming that child before returning. Resolves to `None` only when there are no
    /// children tracked at all (callers should await this inside a `select!` alongside other
    /// event sources rather than treating `None` as a terminal condition).
    pub async fn next(&mut self) -> Option<(CompleteTopicName, Result<Message>)> {
        loop {
            let (topic, result) = self.pending.next().await?;
            let _ = self.armed.remove(&topic);
            if let Some(stream) = self.children.get(&topic).cloned() {
                self.arm(topic.clone(), stream);
                return Some((topic, result));
            }
            // Removed while in flight: drop the stale result and keep waiting.
        }
    }
}

impl Default for TaskSeq {
    fn default() -> Self {
        Self::new()
    }
}
