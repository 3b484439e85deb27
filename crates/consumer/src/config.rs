// SPDX-License-Identifier: Apache-2.0

//! Consumer configuration.

use crate::message::MessageId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Subscription type, as negotiated with the broker. Carried through to every child
/// consumer; the multi-topic consumer itself is agnostic to it except where noted (e.g.
/// `redeliver_unacknowledged` only means something distinct from `redeliver_all` under
/// `Shared`/`KeyShared`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionType {
    /// A single consumer may be attached to the subscription.
    Exclusive,
    /// Multiple consumers may attach; each gets a disjoint shard of keys.
    Failover,
    /// Multiple consumers may attach; messages are load-balanced round-robin.
    Shared,
    /// Multiple consumers may attach; messages are load-balanced by key.
    KeyShared,
}

/// Governs when a pending `batch_receive` is satisfied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchReceivePolicy {
    /// Reply once at least this many messages are available.
    pub max_num_messages: usize,
    /// Reply once queued payload bytes reach this total.
    pub max_num_bytes: usize,
    /// Reply with whatever is available once this much time has elapsed, even if neither
    /// limit above was reached (possibly an empty batch).
    pub timeout: Duration,
}

impl Default for BatchReceivePolicy {
    fn default() -> Self {
        Self {
            max_num_messages: 100,
            max_num_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(100),
        }
    }
}

impl BatchReceivePolicy {
    /// `true` when any of the count/byte limits is met by the given queue state.
    #[must_use]
    pub fn limit_reached(&self, queued_messages: usize, queued_bytes: usize) -> bool {
        queued_messages >= self.max_num_messages || queued_bytes >= self.max_num_bytes
    }
}

/// Every option the multi-topic consumer core recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-child-consumer prefetch queue size.
    pub receiver_queue_size: usize,
    /// Upper bound on the sum of all children's `receiver_queue_size`, used to compute the
    /// fair per-partition share when partitions grow.
    pub max_total_receiver_queue_size_across_partitions: usize,
    /// Deadline after which an unacknowledged message is redelivered.
    pub ack_timeout: Duration,
    /// How often the unacked-message tracker scans for expired deadlines.
    pub ack_timeout_tick_time: Duration,
    /// Batch-receive bounds.
    pub batch_receive_policy: BatchReceivePolicy,
    /// Whether the partition watcher is active.
    pub auto_update_partitions: bool,
    /// Partition watcher polling interval.
    pub auto_update_partitions_interval: Duration,
    /// Pattern watcher polling interval (only used in pattern mode).
    pub pattern_auto_discovery_period: Duration,
    /// Negotiated subscription type.
    pub subscription_type: SubscriptionType,
    /// Whether `reconsume_later` is permitted.
    pub retry_enable: bool,
    /// Where to position a brand new subscription.
    pub start_message_id: Option<MessageId>,
    /// How far back of `start_message_id` to roll back on first connect.
    pub start_message_rollback_duration: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            receiver_queue_size: 1000,
            max_total_receiver_queue_size_across_partitions: 50_000,
            ack_timeout: Duration::ZERO,
            ack_timeout_tick_time: Duration::from_millis(1000),
            batch_receive_policy: BatchReceivePolicy::default(),
            auto_update_partitions: true,
            auto_update_partitions_interval: Duration::from_secs(60),
            pattern_auto_discovery_period: Duration::from_secs(60),
            subscription_type: SubscriptionType::Exclusive,
            retry_enable: false,
            start_message_id: None,
            start_message_rollback_duration: Duration::ZERO,
        }
    }
}

impl Config {
    /// The resume threshold below which a withheld poller reply is released: half of
    /// `receiver_queue_size`.
    #[must_use]
    pub fn resume_threshold(&self) -> usize {
        self.receiver_queue_size / 2
    }

    /// The per-child receiver queue size to use when creating `total_consumers` children,
    /// honoring `max_total_receiver_queue_size_across_partitions`.
    #[must_use]
    pub fn fair_share_queue_size(&self, total_consumers: usize) -> usize {
        let total_consumers = total_consumers.max(1);
        self.receiver_queue_size.min(
            self.max_total_receiver_queue_size_across_partitions / total_consumers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_threshold_is_half_queue_size() {
        let cfg = Config {
            receiver_queue_size: 10,
            ..Config::default()
        };
        assert_eq!(cfg.resume_threshold(), 5);
    }

    #[test]
    fn fair_share_respects_global_cap() {
        let cfg = Config {
            receiver_queue_size: 1000,
            max_total_receiver_queue_size_across_partitions: 100,
            ..Config::default()
        };
        assert_eq!(cfg.fair_share_queue_size(4), 25);
        assert_eq!(cfg.fair_share_queue_size(1000), 0);
    }

    #[test]
    fn batch_policy_limit_reached_on_either_bound() {
        let policy = BatchReceivePolicy {
            max_num_messages: 10,
            max_num_bytes: 100,
            timeout: Duration::from_millis(1),
        };
        assert!(policy.limit_reached(10, 0));
        assert!(policy.limit_reached(0, 100));
        assert!(!policy.limit_reached(9, 99));
    }
}
