// SPDX-License-Identifier: Apache-2.0

//! `UnackedTracker`: a deadline-ordered tracker that flags messages for redelivery once they
//! age past `Config::ack_timeout` without being acknowledged.
//!
//! Built on the same lazy-invalidation timer-wheel shape used elsewhere for recurring
//! per-key timers: a min-heap keyed by deadline, with a side table that is the source of
//! truth for which entries are still live. Popping a stale heap entry is a no-op rather than
//! an error.

use crate::message::ConcreteMessageId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

struct Tracked {
    seq: u64,
    deadline: Instant,
}

/// Tracks delivered-but-unacknowledged messages and their redelivery deadlines.
///
/// Disabled entirely when constructed with a zero `ack_timeout` (the default), matching the
/// convention that `Duration::ZERO` means "never redeliver on a timer".
pub struct UnackedTracker {
    ack_timeout: Duration,
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    by_id: HashMap<ConcreteMessageId, Tracked>,
    seq_to_id: HashMap<u64, ConcreteMessageId>,
    next_seq: u64,
}

impl UnackedTracker {
    /// A tracker using `ack_timeout` as the redelivery deadline. A zero duration disables
    /// tracking: [`UnackedTracker::track`] becomes a no-op.
    #[must_use]
    pub fn new(ack_timeout: Duration) -> Self {
        Self {
            ack_timeout,
            heap: BinaryHeap::new(),
            by_id: HashMap::new(),
            seq_to_id: HashMap::new(),
            next_seq: 0,
        }
    }

    /// `true` when `ack_timeout` is non-zero and redelivery tracking is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ack_timeout.is_zero()
    }

    /// Number of messages currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// `true` when no messages are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Begins tracking `id` for redelivery after `ack_timeout`. A no-op when disabled.
    pub fn track(&mut self, id: ConcreteMessageId) {
        if !self.is_enabled() {
            return;
        }
        let deadline = Instant::now() + self.ack_timeout;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((deadline, seq)));
        let _ = self.seq_to_id.insert(seq, id.clone());
        let _ = self.by_id.insert(id, Tracked { seq, deadline });
    }

    /// Stops tracking a single message (acked, naked, or redelivered). Returns `true` if it
    /// was being tracked.
    pub fn remove(&mut self, id: &ConcreteMessageId) -> bool {
        if let Some(tracked) = self.by_id.remove(id) {
            let _ = self.seq_to_id.remove(&tracked.seq);
            true
        } else {
            false
        }
    }

    /// Stops tracking every message in the same `(topic, partition)` as `id` that is ordered
    /// at or before it (cumulative ack). Messages in other partitions are untouched, since no
    /// order is defined across them. Returns the number of entries removed.
    pub fn remove_until(&mut self, id: &crate::message::MessageId) -> usize {
        let target = match id {
            crate::message::MessageId::Concrete(concrete) => concrete,
            crate::message::MessageId::Earliest | crate::message::MessageId::Latest => {
                return 0;
            }
        };
        let wrapped = crate::message::MessageId::Concrete(target.clone());
        let to_remove: Vec<ConcreteMessageId> = self
            .by_id
            .keys()
            .filter(|tracked_id| {
                let tracked = crate::message::MessageId::Concrete((*tracked_id).clone());
                matches!(
                    tracked.partial_cmp_within_partition(&wrapped),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                )
            })
            .cloned()
            .collect();
        let removed = to_remove.len();
        for tracked_id in to_remove {
            let _ = self.remove(&tracked_id);
        }
        removed
    }

    /// Drops every tracked entry (used after `Seek`/`RedeliverAll`, which invalidate all
    /// outstanding deadlines at once).
    pub fn clear(&mut self) {
        self.heap.clear();
        self.by_id.clear();
        self.seq_to_id.clear();
    }

    /// Discards stale heap entries at the top and returns the next live deadline, if any.
    fn clean_stale_head(&mut self) {
        while let Some(Reverse((_, seq))) = self.heap.peek().copied() {
            if self.seq_to_id.contains_key(&seq) {
                break;
            }
            let _ = self.heap.pop();
        }
    }

    /// The next deadline at which at least one tracked message expires, if any.
    pub fn next_expiry(&mut self) -> Option<Instant> {
        self.clean_stale_head();
        self.heap.peek().map(|Reverse((when, _))| *when)
    }

    /// Pops and removes every entry whose deadline is at or before `now`, returning the ids
    /// in deadline order. Callers are expected to redeliver each returned id and, if it is
    /// delivered again, re-track it via [`UnackedTracker::track`].
    pub fn fire_due(&mut self, now: Instant) -> Vec<ConcreteMessageId> {
        let mut due = Vec::new();
        loop {
            self.clean_stale_head();
            let Some(Reverse((when, seq))) = self.heap.peek().copied() else {
                break;
            };
            if when > now {
                break;
            }
            let _ = self.heap.pop();
            if let Some(id) = self.seq_to_id.remove(&seq) {
                let _ = self.by_id.remove(&id);
                due.push(id);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageId;
    use std::time::Duration;

    fn concrete(ledger: u64, entry: u64, partition: i32, topic: &str) -> ConcreteMessageId {
        ConcreteMessageId {
            ledger_id: ledger,
            entry_id: entry,
            batch_index: None,
            partition,
            topic: topic.into(),
        }
    }

    #[test]
    fn disabled_when_ack_timeout_is_zero() {
        let mut tracker = UnackedTracker::new(Duration::ZERO);
        assert!(!tracker.is_enabled());
        tracker.track(concrete(1, 1, 0, "t-partition-0"));
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_deadline_and_not_before() {
        let mut tracker = UnackedTracker::new(Duration::from_millis(100));
        let id = concrete(1, 1, 0, "t-partition-0");
        tracker.track(id.clone());

        assert!(tracker.fire_due(Instant::now()).is_empty());
        tokio::time::advance(Duration::from_millis(150)).await;
        let due = tracker.fire_due(Instant::now());
        assert_eq!(due, vec![id]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn remove_stops_tracking() {
        let mut tracker = UnackedTracker::new(Duration::from_secs(10));
        let id = concrete(1, 1, 0, "t-partition-0");
        tracker.track(id.clone());
        assert!(tracker.remove(&id));
        assert!(tracker.is_empty());
        assert!(!tracker.remove(&id));
    }

    #[test]
    fn remove_until_only_touches_same_partition() {
        let mut tracker = UnackedTracker::new(Duration::from_secs(10));
        let a1 = concrete(1, 1, 0, "t-partition-0");
        let a2 = concrete(1, 2, 0, "t-partition-0");
        let b1 = concrete(1, 1, 1, "t-partition-1");
        tracker.track(a1.clone());
        tracker.track(a2.clone());
        tracker.track(b1.clone());

        let removed = tracker.remove_until(&MessageId::Concrete(a2));
        assert_eq!(removed, 2);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.by_id.contains_key(&b1));
    }

    #[test]
    fn clear_drops_everything() {
        let mut tracker = UnackedTracker::new(Duration::from_secs(10));
        tracker.track(concrete(1, 1, 0, "t-partition-0"));
        tracker.track(concrete(1, 2, 0, "t-partition-0"));
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.next_expiry(), None);
    }
}
