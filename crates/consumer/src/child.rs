// SPDX-License-Identifier: Apache-2.0

//! The `ChildConsumer` contract: a per-partition/per-topic consumer, consumed as an opaque
//! collaborator. The wire protocol, connection pool, and broker lookup behind a real
//! implementation are out of scope for this crate — only the contract matters here.

use crate::config::Config;
use crate::message::{ConcreteMessageId, Message, MessageId};
use crate::topic::CompleteTopicName;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// The error type a [`ChildConsumer`] implementation returns. Opaque by design: the core only
/// ever stringifies it (via [`crate::error::format_error_sources`]) when wrapping it into
/// [`crate::error::Error::ChildOperationFailed`].
pub type ChildError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for [`ChildConsumer`] methods.
pub type ChildResult<T> = std::result::Result<T, ChildError>;

/// A seek target: either a publish timestamp or a concrete/sentinel message id.
#[derive(Debug, Clone)]
pub enum SeekData {
    /// Seek to the first entry published at or after this time.
    Timestamp(SystemTime),
    /// Seek to (or just past) a specific message id.
    MessageId(MessageId),
}

/// Aggregated statistics for one child consumer. [`crate::stats::reduce`] combines these
/// across every child of a multi-topic consumer.
#[derive(Debug, Clone, Default)]
pub struct ChildStats {
    /// Messages received since the child was created.
    pub num_msgs_received: u64,
    /// Payload bytes received since the child was created.
    pub num_bytes_received: u64,
    /// Acknowledgements sent successfully.
    pub num_acks_sent: u64,
    /// Acknowledgements that failed.
    pub num_acks_failed: u64,
    /// Receive calls that failed.
    pub num_receive_failed: u64,
    /// Messages currently redelivered-pending (unacked past their deadline at least once).
    pub num_msgs_redelivered: u64,
    /// The reporting interval this snapshot covers.
    pub interval_duration: Duration,
}

/// A per-partition/per-topic consumer. Implementations wrap the wire protocol, connection
/// pool, and broker lookup; this crate only ever calls through this trait.
#[async_trait::async_trait]
pub trait ChildConsumer: Send + Sync {
    /// The complete (partition-qualified) topic name this child serves.
    fn topic(&self) -> &CompleteTopicName;

    /// Waits for and returns the next message. A child that has reached the end of a
    /// non-retained topic should park this call forever rather than erroring (see
    /// [`ChildConsumer::has_reached_end_of_topic`]); a transient failure should return an
    /// error without poisoning subsequent calls.
    async fn receive(&self) -> ChildResult<Message>;

    /// Acknowledges a single message.
    async fn ack(&self, id: &ConcreteMessageId) -> ChildResult<()>;

    /// Acknowledges every message up to and including `id`.
    async fn ack_cumulative(&self, id: &ConcreteMessageId) -> ChildResult<()>;

    /// Negatively acknowledges a message, scheduling it for prompt redelivery.
    async fn negative_ack(&self, id: &ConcreteMessageId) -> ChildResult<()>;

    /// Redelivers every currently unacknowledged message for this child.
    async fn redeliver_all(&self) -> ChildResult<()>;

    /// Redelivers exactly the given (already-delivered, unacked) messages. Only meaningfully
    /// distinct from `redeliver_all` under `Shared`/`KeyShared` subscriptions.
    async fn redeliver_unacknowledged(&self, ids: &[ConcreteMessageId]) -> ChildResult<()>;

    /// Repositions the child's read cursor.
    async fn seek(&self, seek: SeekData) -> ChildResult<()>;

    /// Schedules a message for redelivery after `delay`, consuming a retry attempt.
    async fn reconsume_later(&self, id: &ConcreteMessageId, delay: Duration) -> ChildResult<()>;

    /// Unsubscribes this child from the broker, releasing the subscription.
    async fn unsubscribe(&self) -> ChildResult<()>;

    /// Releases local resources (connections, timers) without unsubscribing.
    async fn dispose(&self) -> ChildResult<()>;

    /// `true` once this child has delivered every retained message and the topic is not
    /// expected to produce more (e.g. a non-partitioned reader that hit a fenced end marker).
    fn has_reached_end_of_topic(&self) -> bool;

    /// The last time this child's connection dropped, if it ever has.
    fn last_disconnected_timestamp(&self) -> Option<SystemTime>;

    /// A snapshot of this child's counters.
    async fn stats(&self) -> ChildResult<ChildStats>;
}

/// The three shapes a multi-topic consumer can be configured with.
#[derive(Debug, Clone)]
pub enum MultiConsumerType {
    /// A single logical topic, fanned out across its partitions.
    Partitioned {
        /// The logical topic name.
        topic: crate::topic::TopicName,
    },
    /// A fixed, caller-supplied set of topics (each possibly itself partitioned).
    MultiTopic {
        /// The logical topics to subscribe to.
        topics: Vec<crate::topic::TopicName>,
    },
    /// A topic pattern, periodically re-resolved against the lookup service.
    Pattern {
        /// The namespace to search for matching topics.
        namespace: String,
        /// The compiled pattern topic names are matched against.
        pattern: regex::Regex,
    },
}

/// Tracks the last known partition count for one partitioned topic, for growth detection.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerInitInfo {
    /// Partition count as of the last successful (re)initialization or growth tick.
    pub partitions: u32,
}

/// Builds child consumers for a complete (partition-qualified) topic name. Wraps whatever
/// wire protocol, connection pool, and broker lookup a real deployment uses; this crate only
/// ever calls through this trait.
#[async_trait::async_trait]
pub trait ChildFactory: Send + Sync {
    /// Creates and subscribes a child consumer for `topic`.
    async fn create(&self, topic: CompleteTopicName, config: &Config) -> ChildResult<Arc<dyn ChildConsumer>>;
}
