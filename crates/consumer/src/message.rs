// SPDX-License-Identifier: Apache-2.0

//! Messages and message identifiers.

use crate::topic::CompleteTopicName;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::SystemTime;

/// A totally-ordered position within a single `(topic, partition)`.
///
/// Two concrete ids are only meaningfully *ordered* relative to each other when they share a
/// topic and partition (see [`MessageId::partial_cmp_within_partition`]); across partitions
/// they are only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Sentinel denoting the start of a topic's retained backlog. Only valid as a seek target.
    Earliest,
    /// Sentinel denoting the most recently published entry. Only valid as a seek target.
    Latest,
    /// A concrete, receivable position.
    Concrete(ConcreteMessageId),
}

/// The fields of a concrete message position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcreteMessageId {
    /// Ledger identifier.
    pub ledger_id: u64,
    /// Entry identifier within the ledger.
    pub entry_id: u64,
    /// Index within a batched entry, if the entry is a batch.
    pub batch_index: Option<u32>,
    /// Partition index, or `-1` for a non-partitioned topic.
    pub partition: i32,
    /// The complete (partition-qualified) topic this id belongs to.
    pub topic: CompleteTopicName,
}

impl MessageId {
    /// Returns the owning topic, if this is a concrete id.
    #[must_use]
    pub fn topic(&self) -> Option<&CompleteTopicName> {
        match self {
            MessageId::Concrete(id) => Some(&id.topic),
            MessageId::Earliest | MessageId::Latest => None,
        }
    }

    /// `true` for the `Earliest`/`Latest` sentinels.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        matches!(self, MessageId::Earliest | MessageId::Latest)
    }

    /// Orders two ids that are known to share a `(topic, partition)`. Returns `None` when they
    /// don't (including when either is a sentinel), since no order is defined across
    /// partitions or for sentinels.
    #[must_use]
    pub fn partial_cmp_within_partition(&self, other: &MessageId) -> Option<Ordering> {
        let (a, b) = match (self, other) {
            (MessageId::Concrete(a), MessageId::Concrete(b)) => (a, b),
            _ => return None,
        };
        if a.topic != b.topic || a.partition != b.partition {
            return None;
        }
        Some(
            a.ledger_id
                .cmp(&b.ledger_id)
                .then(a.entry_id.cmp(&b.entry_id))
                .then(a.batch_index.unwrap_or(0).cmp(&b.batch_index.unwrap_or(0))),
        )
    }
}

/// Publish-time metadata carried alongside a message's payload.
#[derive(Debug, Clone, Default)]
pub struct PublishMetadata {
    /// Wall-clock time the broker recorded for this entry.
    pub publish_time: Option<SystemTime>,
    /// Name of the producer that published this entry, if known.
    pub producer_name: Option<String>,
    /// Producer-assigned sequence id, if known.
    pub sequence_id: Option<u64>,
    /// User-defined key/value properties attached at publish time.
    pub properties: HashMap<String, String>,
}

/// An immutable, received message.
#[derive(Debug, Clone)]
pub struct Message {
    /// The message payload.
    pub payload: bytes::Bytes,
    /// This message's position, always [`MessageId::Concrete`].
    pub id: MessageId,
    /// The complete topic name of the child consumer that delivered this message.
    pub topic: CompleteTopicName,
    /// Publish-time metadata.
    pub metadata: PublishMetadata,
}

impl Message {
    /// Number of bytes in the payload, used for `incomingBytes` bookkeeping and
    /// `BatchReceivePolicy::max_num_bytes`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// `true` when the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A bounded batch of messages returned by `batch_receive`.
#[derive(Debug, Clone, Default)]
pub struct Messages(pub Vec<Message>);

impl Messages {
    /// Total payload bytes across every message in the batch.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.0.iter().map(Message::len).sum()
    }

    /// Number of messages in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(ledger: u64, entry: u64, partition: i32, topic: &str) -> MessageId {
        MessageId::Concrete(ConcreteMessageId {
            ledger_id: ledger,
            entry_id: entry,
            batch_index: None,
            partition,
            topic: topic.into(),
        })
    }

    #[test]
    fn orders_within_same_partition() {
        let a = id(1, 1, 0, "t-partition-0");
        let b = id(1, 2, 0, "t-partition-0");
        assert_eq!(a.partial_cmp_within_partition(&b), Some(Ordering::Less));
    }

    #[test]
    fn unordered_across_partitions() {
        let a = id(1, 1, 0, "t-partition-0");
        let b = id(1, 1, 1, "t-partition-1");
        assert_eq!(a.partial_cmp_within_partition(&b), None);
        // still comparable for equality
        assert_ne!(a, b);
    }

    #[test]
    fn sentinels_are_not_ordered() {
        let a = MessageId::Earliest;
        let b = id(1, 1, 0, "t-partition-0");
        assert_eq!(a.partial_cmp_within_partition(&b), None);
    }
}
