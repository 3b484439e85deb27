// SPDX-License-Identifier: Apache-2.0

//! External collaborators consumed only through their interface: broker lookup and the
//! shared connection pool. Neither the wire protocol nor connection management is in scope
//! here.

use crate::topic::{CompleteTopicName, TopicName};

/// The error type a [`BinaryLookupService`]/[`ConnectionPool`] implementation returns.
pub type LookupError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for lookup-service and connection-pool calls.
pub type LookupResult<T> = std::result::Result<T, LookupError>;

/// Partition count for a (possibly non-partitioned) topic.
#[derive(Debug, Clone, Copy)]
pub struct PartitionedTopicMetadata {
    /// Number of partitions; `0` for a non-partitioned topic.
    pub partitions: u32,
}

/// Broker discovery surface the multi-topic consumer depends on.
#[async_trait::async_trait]
pub trait BinaryLookupService: Send + Sync {
    /// Resolves the current partition-qualified topic names for a (possibly partitioned)
    /// topic.
    async fn get_partitions_for_topic(
        &self,
        topic: &TopicName,
    ) -> LookupResult<Vec<CompleteTopicName>>;

    /// Resolves partition count metadata for a topic, used by the partition watcher to
    /// detect growth.
    async fn get_partitioned_topic_metadata(
        &self,
        topic: &TopicName,
    ) -> LookupResult<PartitionedTopicMetadata>;

    /// Resolves the broker service URL currently serving lookups.
    async fn get_service_url(&self) -> LookupResult<String>;

    /// Lists topics in `namespace` matching `pattern`, used by the pattern watcher to
    /// recompute the desired topic set.
    async fn get_topics(
        &self,
        namespace: &str,
        pattern: &regex::Regex,
    ) -> LookupResult<Vec<TopicName>>;
}

/// The shared TCP/TLS connection pool, consumed only for orderly shutdown.
#[async_trait::async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Closes every pooled connection.
    async fn close(&self) -> LookupResult<()>;
}
