// SPDX-License-Identifier: Apache-2.0

//! `MultiTopicConsumer`: the public facade over the Core Actor. Every method here is a thin
//! request/reply round trip through the actor's mailbox; no business logic lives here beyond
//! parameter validation that must fail synchronously.

use crate::actor::{Actor, ActorParams, Event, SeekResolver};
use crate::child::{ChildFactory, MultiConsumerType, SeekData};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lookup::BinaryLookupService;
use crate::message::{Message, MessageId, Messages};
use crate::stats::ConsumerStats;
use mtc_channel::mailbox::Sender;
use mtc_channel::reply::reply_channel;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// A single logical subscription fanned out across any number of child consumers — one
/// logical topic's partitions, a fixed list of topics, or every topic matching a pattern.
pub struct MultiTopicConsumer {
    mailbox: Sender<Event>,
    topic: String,
    name: String,
    retry_enable: bool,
}

impl MultiTopicConsumer {
    /// Builds and initializes a multi-topic consumer: spawns the Core Actor, runs `Init`, and
    /// waits for the result. On success the actor, poller, and any watchers are already
    /// running on the current runtime. On failure no background task is left running.
    pub async fn new(
        mode: MultiConsumerType,
        config: Config,
        lookup: Arc<dyn BinaryLookupService>,
        factory: Arc<dyn ChildFactory>,
        name: impl Into<String>,
    ) -> Result<Arc<Self>> {
        Self::with_cleanup(mode, config, lookup, factory, name, None).await
    }

    /// As [`MultiTopicConsumer::new`], but registers `cleanup_hook` to run once, after
    /// `stopConsumer` completes — used by [`crate::client::ClientRegistry`] to deregister
    /// itself without the consumer needing to know about the registry.
    pub async fn with_cleanup(
        mode: MultiConsumerType,
        config: Config,
        lookup: Arc<dyn BinaryLookupService>,
        factory: Arc<dyn ChildFactory>,
        name: impl Into<String>,
        cleanup_hook: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<Arc<Self>> {
        let retry_enable = config.retry_enable;
        let params = ActorParams {
            mode,
            config,
            lookup,
            factory,
            cleanup_hook,
        };
        let (actor, handle, poller_rx) = Actor::new(params, DEFAULT_MAILBOX_CAPACITY);
        let (created_tx, created_rx) = reply_channel();
        let _ = tokio::spawn(actor.run(poller_rx, created_tx));
        created_rx.recv().await.map_err(Error::from)??;

        Ok(Arc::new(Self {
            mailbox: handle.mailbox,
            topic: format!("MultiTopicsConsumer-{:x}", rand::random::<u64>()),
            name: name.into(),
            retry_enable,
        }))
    }

    /// The synthetic topic identifier: `MultiTopicsConsumer-<random>`.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The caller-chosen or auto-generated consumer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn request<T>(&self, build: impl FnOnce(mtc_channel::reply::ReplySender<T>) -> Event) -> Result<T> {
        let (reply, rx) = reply_channel();
        self.mailbox.send(build(reply)).await?;
        Ok(rx.recv().await?)
    }

    /// Waits for and returns the next message, optionally cancellable.
    pub async fn receive(&self, cancellation: Option<CancellationToken>) -> Result<Message> {
        self.request(|reply| Event::Receive { cancellation, reply }).await?
    }

    /// Waits for a bounded batch of messages, optionally cancellable.
    pub async fn batch_receive(&self, cancellation: Option<CancellationToken>) -> Result<Messages> {
        self.request(|reply| Event::BatchReceive { cancellation, reply })
            .await?
    }

    /// Acknowledges a single message.
    pub async fn acknowledge(&self, id: MessageId) -> Result<()> {
        self.request(|reply| Event::Acknowledge { id, reply }).await?
    }

    /// Acknowledges every message in `messages`, in order. Stops at the first failure.
    pub async fn acknowledge_messages(&self, messages: &Messages) -> Result<()> {
        for message in &messages.0 {
            self.acknowledge(message.id.clone()).await?;
        }
        Ok(())
    }

    /// Acknowledges every message up to and including `id`, within its own partition.
    pub async fn acknowledge_cumulative(&self, id: MessageId) -> Result<()> {
        self.request(|reply| Event::AcknowledgeCumulative { id, reply })
            .await?
    }

    /// Negatively acknowledges a single message, scheduling prompt redelivery.
    pub async fn negative_acknowledge(&self, id: MessageId) -> Result<()> {
        self.request(|reply| Event::NegativeAcknowledge { id, reply }).await?
    }

    /// Negatively acknowledges every message in `messages`. Stops at the first failure.
    pub async fn negative_acknowledge_messages(&self, messages: &Messages) -> Result<()> {
        for message in &messages.0 {
            self.negative_acknowledge(message.id.clone()).await?;
        }
        Ok(())
    }

    /// Redelivers every unacknowledged message across every child.
    pub async fn redeliver_unacknowledged_messages(&self) -> Result<()> {
        self.request(|reply| Event::RedeliverAll { reply }).await?
    }

    /// Redelivers exactly the given messages. Only distinct from
    /// [`MultiTopicConsumer::redeliver_unacknowledged_messages`] under
    /// `Shared`/`KeyShared` subscriptions.
    pub async fn redeliver_unacknowledged(&self, ids: Vec<MessageId>) -> Result<()> {
        self.request(|reply| Event::RedeliverUnacknowledged { ids, reply })
            .await?
    }

    /// Seeks every child to the same target. A `MessageId` target other than
    /// `Earliest`/`Latest` is rejected synchronously: a multi-topic view has no single
    /// meaningful cross-child position.
    pub async fn seek(&self, seek: SeekData) -> Result<()> {
        if let SeekData::MessageId(id) = &seek {
            if !id.is_sentinel() {
                return Err(Error::IllegalMessageId { message_id: id.clone() });
            }
        }
        self.request(|reply| Event::Seek { seek, reply }).await?
    }

    /// Seeks each child to a target computed from its own topic.
    pub async fn seek_with_resolver(&self, resolver: SeekResolver) -> Result<()> {
        self.request(|reply| Event::SeekWithResolver { resolver, reply })
            .await?
    }

    /// `true` once every child has reached the end of its topic.
    pub async fn has_reached_end_of_topic(&self) -> Result<bool> {
        Ok(self
            .request(|reply| Event::HasReachedEndOfTheTopic { reply })
            .await?)
    }

    /// The latest disconnection timestamp across children, if any has ever disconnected.
    pub async fn last_disconnected_timestamp(&self) -> Result<Option<SystemTime>> {
        Ok(self
            .request(|reply| Event::LastDisconnectedTimestamp { reply })
            .await?)
    }

    /// An aggregated statistics snapshot across every child.
    pub async fn get_stats(&self) -> Result<ConsumerStats> {
        self.request(|reply| Event::GetStats { reply }).await?
    }

    /// `true` when the incoming queue currently holds at least one entry. An approximation of
    /// "a child has a message ready": `ChildConsumer` exposes no per-child readiness probe, so
    /// this reports queue occupancy rather than per-child state.
    pub async fn has_message_available(&self) -> Result<bool> {
        Ok(self
            .request(|reply| Event::HasMessageAvailable { reply })
            .await?)
    }

    /// Schedules a single message for retry after `delay`. Fails synchronously when
    /// `Config::retry_enable` is `false`.
    pub async fn reconsume_later(&self, id: MessageId, delay: Duration) -> Result<()> {
        if !self.retry_enable {
            return Err(Error::RetryDisabled);
        }
        self.request(|reply| Event::ReconsumeLater { id, delay, reply })
            .await?
    }

    /// Schedules a batch of messages for retry, processed in order. Fails synchronously when
    /// `Config::retry_enable` is `false`.
    pub async fn reconsume_later_batch(&self, ids: Vec<MessageId>, delay: Duration) -> Result<()> {
        if !self.retry_enable {
            return Err(Error::RetryDisabled);
        }
        self.request(|reply| Event::ReconsumeLaterBatch { ids, delay, reply })
            .await?
    }

    /// Inherently unsupported across a multi-topic view: there is no single last message id.
    pub async fn get_last_message_id(&self) -> Result<MessageId> {
        Err(Error::NotSupported)
    }

    /// Closes the consumer, best-effort: every child is disposed even if some fail.
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| Event::Close { reply }).await?
    }

    /// Unsubscribes the consumer. Unlike `close`, a child failure here surfaces to the caller
    /// and leaves the consumer in a terminal `Failed` state.
    pub async fn unsubscribe(&self) -> Result<()> {
        self.request(|reply| Event::Unsubscribe { reply }).await?
    }

    /// Releases local resources without unsubscribing. Equivalent to `close` at the multi-topic
    /// level: both tear down every child via `dispose`.
    pub async fn dispose(&self) -> Result<()> {
        self.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child::{ChildConsumer, ChildResult, ChildStats};
    use crate::lookup::{LookupResult, PartitionedTopicMetadata};
    use crate::topic::{CompleteTopicName, TopicName};
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use std::time::SystemTime;

    struct OneShotChild {
        topic: CompleteTopicName,
        delivered: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ChildConsumer for OneShotChild {
        fn topic(&self) -> &CompleteTopicName {
            &self.topic
        }
        async fn receive(&self) -> ChildResult<Message> {
            if self.delivered.swap(true, Ordering::SeqCst) {
                std::future::pending::<()>().await;
                unreachable!("pending never resolves");
            }
            Ok(Message {
                payload: bytes::Bytes::from_static(b"payload"),
                id: MessageId::Concrete(crate::message::ConcreteMessageId {
                    ledger_id: 1,
                    entry_id: 1,
                    batch_index: None,
                    partition: 0,
                    topic: self.topic.clone(),
                }),
                topic: self.topic.clone(),
                metadata: crate::message::PublishMetadata::default(),
            })
        }
        async fn ack(&self, _id: &crate::message::ConcreteMessageId) -> ChildResult<()> {
            Ok(())
        }
        async fn ack_cumulative(&self, _id: &crate::message::ConcreteMessageId) -> ChildResult<()> {
            Ok(())
        }
        async fn negative_ack(&self, _id: &crate::message::ConcreteMessageId) -> ChildResult<()> {
            Ok(())
        }
        async fn redeliver_all(&self) -> ChildResult<()> {
            Ok(())
        }
        async fn redeliver_unacknowledged(
            &self,
            _ids: &[crate::message::ConcreteMessageId],
        ) -> ChildResult<()> {
            Ok(())
        }
        async fn seek(&self, _seek: SeekData) -> ChildResult<()> {
            Ok(())
        }
        async fn reconsume_later(
            &self,
            _id: &crate::message::ConcreteMessageId,
            _delay: Duration,
        ) -> ChildResult<()> {
            Ok(())
        }
        async fn unsubscribe(&self) -> ChildResult<()> {
            Ok(())
        }
        async fn dispose(&self) -> ChildResult<()> {
            Ok(())
        }
        fn has_reached_end_of_topic(&self) -> bool {
            false
        }
        fn last_disconnected_timestamp(&self) -> Option<SystemTime> {
            None
        }
        async fn stats(&self) -> ChildResult<ChildStats> {
            Ok(ChildStats::default())
        }
    }

    struct SingleTopicFactory;

    #[async_trait]
    impl ChildFactory for SingleTopicFactory {
        async fn create(
            &self,
            topic: CompleteTopicName,
            _config: &Config,
        ) -> ChildResult<Arc<dyn ChildConsumer>> {
            Ok(Arc::new(OneShotChild {
                topic,
                delivered: std::sync::atomic::AtomicBool::new(false),
            }))
        }
    }

    struct NonPartitionedLookup;

    #[async_trait]
    impl BinaryLookupService for NonPartitionedLookup {
        async fn get_partitions_for_topic(
            &self,
            topic: &TopicName,
        ) -> LookupResult<Vec<CompleteTopicName>> {
            Ok(vec![topic.as_complete()])
        }
        async fn get_partitioned_topic_metadata(
            &self,
            _topic: &TopicName,
        ) -> LookupResult<PartitionedTopicMetadata> {
            Ok(PartitionedTopicMetadata { partitions: 0 })
        }
        async fn get_service_url(&self) -> LookupResult<String> {
            Ok("pulsar://localhost:6650".to_owned())
        }
        async fn get_topics(
            &self,
            _namespace: &str,
            _pattern: &regex::Regex,
        ) -> LookupResult<Vec<TopicName>> {
            Ok(Vec::new())
        }
    }

    async fn single_topic_consumer(topic: &str) -> Arc<MultiTopicConsumer> {
        MultiTopicConsumer::new(
            MultiConsumerType::Partitioned { topic: topic.into() },
            Config::default(),
            Arc::new(NonPartitionedLookup),
            Arc::new(SingleTopicFactory),
            "test-consumer",
        )
        .await
        .expect("init succeeds")
    }

    #[tokio::test]
    async fn receive_then_acknowledge_round_trips() {
        let consumer = single_topic_consumer("persistent://tnt/ns/t").await;
        let message = consumer.receive(None).await.expect("message");
        consumer.acknowledge(message.id).await.expect("ack");
        consumer.close().await.expect("close");
    }

    #[tokio::test]
    async fn seek_to_a_non_sentinel_message_id_is_rejected_synchronously() {
        let consumer = single_topic_consumer("persistent://tnt/ns/t").await;
        let id = MessageId::Concrete(crate::message::ConcreteMessageId {
            ledger_id: 0,
            entry_id: 0,
            batch_index: None,
            partition: 0,
            topic: "persistent://tnt/ns/t".into(),
        });
        let err = consumer
            .seek(SeekData::MessageId(id))
            .await
            .expect_err("non sentinel seek rejected");
        assert!(matches!(err, Error::IllegalMessageId { .. }));
        consumer.close().await.expect("close");
    }

    #[tokio::test]
    async fn reconsume_later_fails_synchronously_when_retry_disabled() {
        let consumer = single_topic_consumer("persistent://tnt/ns/t").await;
        let id = MessageId::Concrete(crate::message::ConcreteMessageId {
            ledger_id: 0,
            entry_id: 0,
            batch_index: None,
            partition: 0,
            topic: "persistent://tnt/ns/t".into(),
        });
        let err = consumer
            .reconsume_later(id, Duration::from_secs(1))
            .await
            .expect_err("retry disabled by default");
        assert!(matches!(err, Error::RetryDisabled));
        consumer.close().await.expect("close");
    }

    #[tokio::test]
    async fn get_last_message_id_is_never_supported() {
        let consumer = single_topic_consumer("persistent://tnt/ns/t").await;
        let err = consumer.get_last_message_id().await.expect_err("unsupported");
        assert!(matches!(err, Error::NotSupported));
        consumer.close().await.expect("close");
    }

    #[tokio::test]
    async fn topic_is_a_synthetic_multi_topics_consumer_identifier() {
        let consumer = single_topic_consumer("persistent://tnt/ns/t").await;
        assert!(consumer.topic().starts_with("MultiTopicsConsumer-"));
        consumer.close().await.expect("close");
    }
}
