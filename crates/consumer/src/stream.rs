// SPDX-License-Identifier: Apache-2.0

//! The Stream adapter: turns a [`ChildConsumer`] into a lazy, restartable producer of
//! `Result<Message>`, with terminal-topic parking.

use crate::child::ChildConsumer;
use crate::error::{ChildErrorKind, Error, Result, format_error_sources};
use crate::message::Message;
use crate::topic::CompleteTopicName;
use std::sync::Arc;

/// A lazy message source over a single child consumer.
///
/// Each call to [`Stream::next`] either returns a message (already carrying the child's
/// [`CompleteTopicName`]), returns a decoded error, or — once the child reports
/// [`ChildConsumer::has_reached_end_of_topic`] — parks forever. A failed call never poisons
/// the Stream: it remains callable afterwards, so the caller can retry via redelivery.
pub struct Stream {
    child: Arc<dyn ChildConsumer>,
}

impl Stream {
    /// Wraps `child` in a Stream.
    #[must_use]
    pub fn new(child: Arc<dyn ChildConsumer>) -> Self {
        Self { child }
    }

    /// The topic this Stream's child serves.
    #[must_use]
    pub fn topic(&self) -> &CompleteTopicName {
        self.child.topic()
    }

    /// Produces the next message, or parks forever once the child has reached the end of a
    /// non-retained topic.
    pub async fn next(&self) -> Result<Message> {
        if self.child.has_reached_end_of_topic() {
            std::future::pending::<()>().await;
            unreachable!("a pending future never resolves");
        }
        self.child.receive().await.map_err(|err| {
            let reason = err.to_string();
            let source_detail = format_error_sources(err.as_ref());
            Error::ChildOperationFailed {
                topic: self.child.topic().clone(),
                kind: ChildErrorKind::Operation,
                reason,
                source_detail,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child::{ChildResult, ChildStats, SeekData};
    use crate::message::{ConcreteMessageId, MessageId, PublishMetadata};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    struct FakeChild {
        topic: CompleteTopicName,
        reached_end: AtomicBool,
        calls: AtomicUsize,
        fail_next: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ChildConsumer for FakeChild {
        fn topic(&self) -> &CompleteTopicName {
            &self.topic
        }

        async fn receive(&self) -> ChildResult<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err("transient failure".into());
            }
            Ok(Message {
                payload: bytes::Bytes::from_static(b"hi"),
                id: MessageId::Concrete(ConcreteMessageId {
                    ledger_id: 0,
                    entry_id: 0,
                    batch_index: None,
                    partition: 0,
                    topic: self.topic.clone(),
                }),
                topic: self.topic.clone(),
                metadata: PublishMetadata::default(),
            })
        }

        async fn ack(&self, _id: &ConcreteMessageId) -> ChildResult<()> {
            Ok(())
        }
        async fn ack_cumulative(&self, _id: &ConcreteMessageId) -> ChildResult<()> {
            Ok(())
        }
        async fn negative_ack(&self, _id: &ConcreteMessageId) -> ChildResult<()> {
            Ok(())
        }
        async fn redeliver_all(&self) -> ChildResult<()> {
            Ok(())
        }
        async fn redeliver_unacknowledged(&self, _ids: &[ConcreteMessageId]) -> ChildResult<()> {
            Ok(())
        }
        async fn seek(&self, _seek: SeekData) -> ChildResult<()> {
            Ok(())
        }
        async fn reconsume_later(
            &self,
            _id: &ConcreteMessageId,
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
            self.reached_end.load(Ordering::SeqCst)
        }
        fn last_disconnected_timestamp(&self) -> Option<SystemTime> {
            None
        }
        async fn stats(&self) -> ChildResult<ChildStats> {
            Ok(ChildStats::default())
        }
    }

    fn fake(topic: &str) -> Arc<FakeChild> {
        Arc::new(FakeChild {
            topic: topic.into(),
            reached_end: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn yields_a_message_tagged_with_its_topic() {
        let child = fake("t-partition-0");
        let stream = Stream::new(child.clone());
        let msg = stream.next().await.expect("message");
        assert_eq!(msg.topic, *child.topic());
    }

    #[tokio::test]
    async fn a_failed_call_does_not_poison_the_stream() {
        let child = fake("t-partition-0");
        child.fail_next.store(true, Ordering::SeqCst);
        let stream = Stream::new(child);
        assert!(stream.next().await.is_err());
        assert!(stream.next().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn reached_end_parks_forever() {
        let child = fake("t-partition-0");
        child.reached_end.store(true, Ordering::SeqCst);
        let stream = Stream::new(child);
        let result = tokio::time::timeout(Duration::from_secs(3600), stream.next()).await;
        assert!(result.is_err(), "next() should never resolve");
    }
}
