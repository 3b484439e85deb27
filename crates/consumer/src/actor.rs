// SPDX-License-Identifier: Apache-2.0

//! The Core Actor: the single-consumer serializer of every state-mutating event. Owns the
//! child table, the incoming queue, both waiter registries, the unacked tracker, and
//! connection state. No other task ever mutates these directly.

use crate::child::{ChildConsumer, ChildError, ChildFactory, SeekData};
use crate::config::Config;
use crate::error::{ChildErrorKind, Error, Result, format_error_sources};
use crate::lookup::BinaryLookupService;
use crate::message::{ConcreteMessageId, Message, MessageId, Messages};
use crate::poller::{Poller, PollerCommand};
use crate::queue::{BatchWaiters, IncomingQueue, Waiters};
use crate::stats::ConsumerStats;
use crate::stream::Stream;
use crate::topic::{CompleteTopicName, TopicName};
use crate::unacked::UnackedTracker;
use crate::{child::ConsumerInitInfo, child::MultiConsumerType};
use futures::future::join_all;
use mtc_channel::mailbox::{Receiver, Sender, mailbox};
use mtc_channel::reply::ReplySender;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A resolver function used by `SeekWithResolver`: maps a child's topic to its seek target.
pub type SeekResolver = Arc<dyn Fn(&CompleteTopicName) -> SeekData + Send + Sync>;

/// Connection lifecycle states. Only the Core Actor writes; everyone else reads through
/// [`ConnectionStateHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Before `Init` has completed.
    Uninitialized = 0,
    /// Serving requests normally.
    Ready = 1,
    /// Tearing down (`Close`/`Unsubscribe` in progress).
    Closing = 2,
    /// Torn down.
    Closed = 3,
    /// `Init` failed, or `Unsubscribe` failed. Terminal.
    Failed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Ready,
            2 => ConnectionState::Closing,
            3 => ConnectionState::Closed,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Uninitialized,
        }
    }
}

/// A cheap, clonable, lock-free read handle on the Core's connection state.
#[derive(Clone)]
pub struct ConnectionStateHandle(Arc<AtomicU8>);

impl ConnectionStateHandle {
    fn new(initial: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(initial as u8)))
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, AtomicOrdering::Release);
    }

    /// Reads the current connection state.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(AtomicOrdering::Acquire))
    }
}

struct ChildEntry {
    child: Arc<dyn ChildConsumer>,
}

/// Every event the Core Actor processes, one at a time, in mailbox arrival order.
pub enum Event {
    /// A message (or error) pulled from one child, plus the Poller's backpressure reply.
    MessageReceived {
        /// Topic of the child that produced this entry.
        topic: CompleteTopicName,
        /// The pulled result.
        message: Result<Message>,
        /// Completed once the event has been fully processed; withheld while the queue is
        /// above the resume threshold.
        reply: ReplySender<()>,
    },
    /// A single-message receive request.
    Receive {
        /// Caller-supplied cancellation, if any.
        cancellation: Option<CancellationToken>,
        /// Where to send the result.
        reply: ReplySender<Result<Message>>,
    },
    /// A bounded batch-receive request.
    BatchReceive {
        /// Caller-supplied cancellation, if any.
        cancellation: Option<CancellationToken>,
        /// Where to send the result.
        reply: ReplySender<Result<Messages>>,
    },
    /// The scheduled timeout for one batch waiter has elapsed.
    SendBatchByTimeout {
        /// Which batch waiter to satisfy.
        waiter_id: u64,
    },
    /// Acknowledges a single message.
    Acknowledge {
        /// Id to acknowledge.
        id: MessageId,
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Negatively acknowledges a single message.
    NegativeAcknowledge {
        /// Id to nack.
        id: MessageId,
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Acknowledges every message up to and including `id`.
    AcknowledgeCumulative {
        /// The cumulative watermark.
        id: MessageId,
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Redelivers every unacknowledged message across every child.
    RedeliverAll {
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Redelivers exactly the given unacknowledged messages (meaningful under
    /// Shared/KeyShared; falls through to `RedeliverAll` otherwise).
    RedeliverUnacknowledged {
        /// The ids to redeliver.
        ids: Vec<MessageId>,
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Seeks every child to the same target.
    Seek {
        /// The seek target.
        seek: SeekData,
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Seeks each child to a target computed from its own topic.
    SeekWithResolver {
        /// Maps a child's topic to its seek target.
        resolver: SeekResolver,
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Fired by the Partition Watcher.
    PartitionTickTime,
    /// Fired by the Pattern Watcher.
    PatternTickTime,
    /// Queries whether every child has reached the end of its topic.
    HasReachedEndOfTheTopic {
        /// Where to send the result.
        reply: ReplySender<bool>,
    },
    /// Queries the latest disconnection timestamp across children.
    LastDisconnectedTimestamp {
        /// Where to send the result.
        reply: ReplySender<Option<SystemTime>>,
    },
    /// Requests an aggregated statistics snapshot.
    GetStats {
        /// Where to send the result.
        reply: ReplySender<Result<ConsumerStats>>,
    },
    /// Schedules a single message for retry after a delay.
    ReconsumeLater {
        /// The message to retry.
        id: MessageId,
        /// Delay before redelivery.
        delay: std::time::Duration,
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Schedules a batch of messages for retry, acknowledging each in order.
    ReconsumeLaterBatch {
        /// The messages to retry, in the order they should be processed.
        ids: Vec<MessageId>,
        /// Delay before redelivery.
        delay: std::time::Duration,
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Queries whether the incoming queue currently holds anything.
    HasMessageAvailable {
        /// Where to send the result.
        reply: ReplySender<bool>,
    },
    /// Detaches a parked single-message waiter (posted by its cancellation registration).
    RemoveWaiter {
        /// The waiter id to detach.
        id: u64,
    },
    /// Detaches a parked batch waiter (posted by its cancellation registration).
    RemoveBatchWaiter {
        /// The waiter id to detach.
        id: u64,
    },
    /// Closes the consumer (best-effort).
    Close {
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
    /// Unsubscribes the consumer (failures surfaced).
    Unsubscribe {
        /// Where to send the result.
        reply: ReplySender<Result<()>>,
    },
}

/// Construction parameters for the Core Actor.
pub struct ActorParams {
    /// Which shape of multi-topic consumer this is.
    pub mode: MultiConsumerType,
    /// Consumer configuration.
    pub config: Config,
    /// Broker discovery collaborator.
    pub lookup: Arc<dyn BinaryLookupService>,
    /// Builds new child consumers.
    pub factory: Arc<dyn ChildFactory>,
    /// Invoked once, after `stopConsumer` completes, to detach from the client lifecycle.
    pub cleanup_hook: Option<Box<dyn FnOnce() + Send>>,
}

/// The running actor: mailbox, children, queues, waiters, and connection state.
pub struct Actor {
    mode: MultiConsumerType,
    config: Config,
    lookup: Arc<dyn BinaryLookupService>,
    factory: Arc<dyn ChildFactory>,
    children: HashMap<CompleteTopicName, ChildEntry>,
    partitioned_topics: HashMap<TopicName, ConsumerInitInfo>,
    all_topics: HashSet<TopicName>,
    queue: IncomingQueue,
    waiters: Waiters,
    batch_waiters: BatchWaiters,
    unacked: UnackedTracker,
    connection_state: ConnectionStateHandle,
    mailbox: Receiver<Event>,
    self_sender: Sender<Event>,
    poller_commands: Sender<PollerCommand>,
    poller_cancel: CancellationToken,
    watcher_cancel: CancellationToken,
    cleanup_hook: Option<Box<dyn FnOnce() + Send>>,
    withheld_poller_reply: Option<ReplySender<()>>,
}

/// A running consumer's externally visible handles: post events here, read state here.
pub struct ActorHandle {
    /// Posts events to the Core Actor's mailbox.
    pub mailbox: Sender<Event>,
    /// Lock-free read handle on the connection state.
    pub connection_state: ConnectionStateHandle,
}

impl Actor {
    /// Builds the actor's mailbox and background wiring, but does not run `Init` yet. Use
    /// [`Actor::run`] (fed the returned `Receiver<PollerCommand>`) to run `Init` and, on
    /// success, start the event loop plus background tasks on the current runtime.
    #[must_use]
    pub fn new(params: ActorParams, mailbox_capacity: usize) -> (Self, ActorHandle, Receiver<PollerCommand>) {
        let (self_sender, mailbox) = mailbox(mailbox_capacity);
        let (poller_tx, poller_rx) = mailbox(mailbox_capacity);
        let connection_state = ConnectionStateHandle::new(ConnectionState::Uninitialized);
        let unacked = UnackedTracker::new(params.config.ack_timeout);
        let handle = ActorHandle {
            mailbox: self_sender.clone(),
            connection_state: connection_state.clone(),
        };
        let actor = Self {
            mode: params.mode,
            config: params.config,
            lookup: params.lookup,
            factory: params.factory,
            children: HashMap::new(),
            partitioned_topics: HashMap::new(),
            all_topics: HashSet::new(),
            queue: IncomingQueue::new(),
            waiters: Waiters::new(),
            batch_waiters: BatchWaiters::new(),
            unacked,
            connection_state,
            mailbox,
            self_sender,
            poller_commands: poller_tx,
            poller_cancel: CancellationToken::new(),
            watcher_cancel: CancellationToken::new(),
            cleanup_hook: params.cleanup_hook,
            withheld_poller_reply: None,
        };
        (actor, handle, poller_rx)
    }

    /// Runs `Init`, and on success spawns the Poller and watcher tasks and drives the event
    /// loop to completion. Returns once the consumer reaches `Closed`/`Failed`.
    pub async fn run(mut self, poller_rx: Receiver<PollerCommand>, created: ReplySender<Result<()>>) {
        if let Err(err) = self.init().await {
            self.connection_state.store(ConnectionState::Failed);
            created.send(Err(err));
            return;
        }
        self.connection_state.store(ConnectionState::Ready);
        created.send(Ok(()));

        let poller = Poller::new(poller_rx, self.self_sender.clone(), self.poller_cancel.clone());
        let _poller_task = tokio::spawn(poller.run());

        let watcher_tasks = self.start_watchers();

        self.event_loop().await;

        for task in watcher_tasks {
            task.abort();
        }
    }

    fn start_watchers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();
        if self.config.auto_update_partitions {
            let watcher = crate::partition_watcher::PartitionWatcher::new(
                self.config.auto_update_partitions_interval,
                self.self_sender.clone(),
                self.watcher_cancel.clone(),
            );
            tasks.push(tokio::spawn(watcher.run()));
        }
        if matches!(self.mode, MultiConsumerType::Pattern { .. }) {
            let watcher = crate::pattern_watcher::PatternWatcher::new(
                self.config.pattern_auto_discovery_period,
                self.self_sender.clone(),
                self.watcher_cancel.clone(),
            );
            tasks.push(tokio::spawn(watcher.run()));
        }
        tasks
    }

    async fn init(&mut self) -> Result<()> {
        let targets = self.resolve_initial_topics().await?;
        let mut created = Vec::with_capacity(targets.len());
        for topic in targets {
            match self.factory.create(topic.clone(), &self.config).await {
                Ok(child) => created.push((topic, child)),
                Err(err) => {
                    for (_, child) in &created {
                        let _ = child.dispose().await;
                    }
                    return Err(Error::InitFailed(format!(
                        "failed to create child for {topic}: {err}{}",
                        format_error_sources(err.as_ref())
                    )));
                }
            }
        }
        for (topic, child) in created {
            self.insert_child(topic, child);
        }
        Ok(())
    }

    async fn resolve_initial_topics(&mut self) -> Result<Vec<CompleteTopicName>> {
        match self.mode.clone() {
            MultiConsumerType::Partitioned { topic } => {
                let names = self.expand_topic(&topic).await?;
                Ok(names)
            }
            MultiConsumerType::MultiTopic { topics } => {
                let mut out = Vec::new();
                for topic in &topics {
                    out.extend(self.expand_topic(topic).await?);
                }
                Ok(out)
            }
            MultiConsumerType::Pattern { namespace, pattern } => {
                let topics = self
                    .lookup
                    .get_topics(&namespace, &pattern)
                    .await
                    .map_err(|e| Error::InitFailed(e.to_string()))?;
                self.all_topics = topics.iter().cloned().collect();
                let mut out = Vec::new();
                for topic in &topics {
                    out.extend(self.expand_topic(topic).await?);
                }
                Ok(out)
            }
        }
    }

    /// Resolves one logical topic into its complete (partition-qualified) names, recording
    /// its partition count for growth detection.
    async fn expand_topic(&mut self, topic: &TopicName) -> Result<Vec<CompleteTopicName>> {
        let metadata = self
            .lookup
            .get_partitioned_topic_metadata(topic)
            .await
            .map_err(|e| Error::InitFailed(e.to_string()))?;
        let _ = self.partitioned_topics.insert(
            topic.clone(),
            ConsumerInitInfo {
                partitions: metadata.partitions,
            },
        );
        if metadata.partitions == 0 {
            Ok(vec![topic.as_complete()])
        } else {
            Ok((0..metadata.partitions).map(|i| topic.partition(i)).collect())
        }
    }

    fn insert_child(&mut self, topic: CompleteTopicName, child: Arc<dyn ChildConsumer>) {
        let stream = Arc::new(Stream::new(child.clone()));
        let _ = self.children.insert(topic, ChildEntry { child });
        // Best-effort: the poller command channel is sized generously and drained promptly;
        // a full channel here would mean the poller has fallen far behind, which the
        // mailbox's backpressure model doesn't otherwise allow.
        let _ = self.poller_commands.try_send(PollerCommand::AddChild(stream));
    }

    async fn remove_child(&mut self, topic: &CompleteTopicName) -> Option<Arc<dyn ChildConsumer>> {
        let entry = self.children.remove(topic)?;
        let _ = self
            .poller_commands
            .try_send(PollerCommand::RemoveChild(topic.clone()));
        Some(entry.child)
    }

    async fn event_loop(&mut self) {
        loop {
            let next_expiry = self.unacked.next_expiry();
            let ack_tick = async move {
                match next_expiry {
                    Some(when) => tokio::time::sleep_until(when).await,
                    None => futures::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                event = self.mailbox.recv() => {
                    let Ok(event) = event else { break };
                    self.handle(event).await;
                    if self.connection_state.load() == ConnectionState::Closed {
                        break;
                    }
                }
                () = ack_tick => {
                    self.fire_unacked_redeliveries().await;
                }
            }
        }
    }

    async fn fire_unacked_redeliveries(&mut self) {
        let due = self.unacked.fire_due(tokio::time::Instant::now());
        let mut by_topic: HashMap<CompleteTopicName, Vec<ConcreteMessageId>> = HashMap::new();
        for id in due {
            by_topic.entry(id.topic.clone()).or_default().push(id);
        }
        for (topic, ids) in by_topic {
            if let Some(entry) = self.children.get(&topic) {
                if let Err(err) = entry.child.redeliver_unacknowledged(&ids).await {
                    warn!(%topic, error = %err, "ack-timeout redelivery failed");
                }
            }
        }
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::MessageReceived { topic, message, reply } => {
                self.on_message_received(topic, message, reply).await;
            }
            Event::Receive { cancellation, reply } => self.on_receive(cancellation, reply),
            Event::BatchReceive { cancellation, reply } => {
                self.on_batch_receive(cancellation, reply);
            }
            Event::SendBatchByTimeout { waiter_id } => self.on_send_batch_by_timeout(waiter_id),
            Event::Acknowledge { id, reply } => self.on_acknowledge(id, reply).await,
            Event::NegativeAcknowledge { id, reply } => {
                self.on_negative_acknowledge(id, reply).await;
            }
            Event::AcknowledgeCumulative { id, reply } => {
                self.on_acknowledge_cumulative(id, reply).await;
            }
            Event::RedeliverAll { reply } => self.on_redeliver_all(reply).await,
            Event::RedeliverUnacknowledged { ids, reply } => {
                self.on_redeliver_unacknowledged(ids, reply).await;
            }
            Event::Seek { seek, reply } => self.on_seek(seek, reply).await,
            Event::SeekWithResolver { resolver, reply } => {
                self.on_seek_with_resolver(resolver, reply).await;
            }
            Event::PartitionTickTime => self.on_partition_tick().await,
            Event::PatternTickTime => self.on_pattern_tick().await,
            Event::HasReachedEndOfTheTopic { reply } => {
                let value = !self.children.is_empty()
                    && self.children.values().all(|c| c.child.has_reached_end_of_topic());
                reply.send(value);
            }
            Event::LastDisconnectedTimestamp { reply } => {
                let value = self
                    .children
                    .values()
                    .filter_map(|c| c.child.last_disconnected_timestamp())
                    .max();
                reply.send(value);
            }
            Event::GetStats { reply } => self.on_get_stats(reply).await,
            Event::ReconsumeLater { id, delay, reply } => {
                self.on_reconsume_later(id, delay, reply).await;
            }
            Event::ReconsumeLaterBatch { ids, delay, reply } => {
                self.on_reconsume_later_batch(ids, delay, reply).await;
            }
            Event::HasMessageAvailable { reply } => reply.send(!self.queue.is_empty()),
            Event::RemoveWaiter { id } => {
                if let Some(waiter) = self.waiters.remove(id) {
                    waiter.reply.send(Err(Error::OperationCancelled));
                }
            }
            Event::RemoveBatchWaiter { id } => {
                if let Some(batch_waiter) = self.batch_waiters.remove(id) {
                    batch_waiter.timeout_guard.cancel();
                    batch_waiter.reply.send(Err(Error::OperationCancelled));
                }
            }
            Event::Close { reply } => self.on_close(reply).await,
            Event::Unsubscribe { reply } => self.on_unsubscribe(reply).await,
        }
    }

    async fn on_message_received(
        &mut self,
        _topic: CompleteTopicName,
        message: Result<Message>,
        reply: ReplySender<()>,
    ) {
        if let Some(waiter) = self.waiters.pop_front() {
            if let Ok(msg) = &message {
                if let MessageId::Concrete(concrete) = &msg.id {
                    self.unacked.track(concrete.clone());
                }
            }
            waiter.reply.send(message);
        } else {
            self.queue.push(message);
            self.try_satisfy_batch_waiter();
        }

        if self.queue.len() > self.config.resume_threshold() {
            // Backpressure: withhold the reply. It will be released the next time a dequeue
            // (via Receive/BatchReceive) brings the count back down, by a held reply being
            // completed from `release_poller_if_resumed`.
            self.withheld_poller_reply = Some(reply);
        } else {
            reply.send(());
        }
    }

    fn try_satisfy_batch_waiter(&mut self) {
        if self.config.batch_receive_policy.limit_reached(self.queue.len(), self.queue.incoming_bytes()) {
            if let Some(batch_waiter) = self.batch_waiters.pop_front() {
                batch_waiter.timeout_guard.cancel();
                let batch = self
                    .queue
                    .drain_batch(self.config.batch_receive_policy.max_num_messages);
                for message in &batch.0 {
                    if let MessageId::Concrete(concrete) = &message.id {
                        self.unacked.track(concrete.clone());
                    }
                }
                batch_waiter.reply.send(Ok(batch));
                self.release_poller_if_resumed();
            }
        }
    }

    fn release_poller_if_resumed(&mut self) {
        if self.queue.len() <= self.config.resume_threshold() {
            if let Some(reply) = self.withheld_poller_reply.take() {
                reply.send(());
            }
        }
    }

    fn on_receive(&mut self, cancellation: Option<CancellationToken>, reply: ReplySender<Result<Message>>) {
        if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            reply.send(Err(Error::OperationCancelled));
            return;
        }
        if let Some(message) = self.queue.pop() {
            if let Ok(msg) = &message {
                if let MessageId::Concrete(concrete) = &msg.id {
                    self.unacked.track(concrete.clone());
                }
            }
            reply.send(message);
            self.release_poller_if_resumed();
        } else {
            let self_sender = self.self_sender.clone();
            let id = self.waiters.register(cancellation.clone(), reply);
            if let Some(token) = cancellation {
                tokio::spawn(async move {
                    token.cancelled().await;
                    let _ = self_sender.send(Event::RemoveWaiter { id }).await;
                });
            }
        }
    }

    fn on_batch_receive(
        &mut self,
        cancellation: Option<CancellationToken>,
        reply: ReplySender<Result<Messages>>,
    ) {
        if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            reply.send(Err(Error::OperationCancelled));
            return;
        }
        if self.batch_waiters.is_empty()
            && self
                .config
                .batch_receive_policy
                .limit_reached(self.queue.len(), self.queue.incoming_bytes())
        {
            let batch = self
                .queue
                .drain_batch(self.config.batch_receive_policy.max_num_messages);
            for message in &batch.0 {
                if let MessageId::Concrete(concrete) = &message.id {
                    self.unacked.track(concrete.clone());
                }
            }
            reply.send(Ok(batch));
            self.release_poller_if_resumed();
            return;
        }
        let self_sender = self.self_sender.clone();
        let (id, timeout_guard) = self.batch_waiters.register(cancellation.clone(), reply);
        let timeout = self.config.batch_receive_policy.timeout;
        let guard = timeout_guard.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(timeout) => {
                    let _ = self_sender.send(Event::SendBatchByTimeout { waiter_id: id }).await;
                }
                () = guard.cancelled() => {}
            }
        });
        if let Some(token) = cancellation {
            let self_sender = self.self_sender.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                let _ = self_sender.send(Event::RemoveBatchWaiter { id }).await;
            });
        }
    }

    fn on_send_batch_by_timeout(&mut self, waiter_id: u64) {
        let Some(batch_waiter) = self.batch_waiters.remove(waiter_id) else {
            return;
        };
        if batch_waiter.timeout_guard.is_cancelled() {
            return;
        }
        let batch = self
            .queue
            .drain_batch(self.config.batch_receive_policy.max_num_messages);
        for message in &batch.0 {
            if let MessageId::Concrete(concrete) = &message.id {
                self.unacked.track(concrete.clone());
            }
        }
        batch_waiter.reply.send(Ok(batch));
        self.release_poller_if_resumed();
    }

    fn wrap_child_error(&self, topic: &CompleteTopicName, kind: ChildErrorKind, err: ChildError) -> Error {
        Error::ChildOperationFailed {
            topic: topic.clone(),
            kind,
            reason: err.to_string(),
            source_detail: format_error_sources(err.as_ref()),
        }
    }

    async fn on_acknowledge(&mut self, id: MessageId, reply: ReplySender<Result<()>>) {
        let MessageId::Concrete(concrete) = &id else {
            reply.send(Err(Error::IllegalMessageId { message_id: id }));
            return;
        };
        let Some(entry) = self.children.get(&concrete.topic) else {
            reply.send(Err(Error::IllegalMessageId { message_id: id }));
            return;
        };
        match entry.child.ack(concrete).await {
            Ok(()) => {
                let _ = self.unacked.remove(concrete);
                reply.send(Ok(()));
            }
            Err(err) => {
                let wrapped = self.wrap_child_error(&concrete.topic, ChildErrorKind::Operation, err);
                reply.send(Err(wrapped));
            }
        }
    }

    async fn on_negative_acknowledge(&mut self, id: MessageId, reply: ReplySender<Result<()>>) {
        let MessageId::Concrete(concrete) = &id else {
            reply.send(Err(Error::IllegalMessageId { message_id: id }));
            return;
        };
        let Some(entry) = self.children.get(&concrete.topic) else {
            reply.send(Err(Error::IllegalMessageId { message_id: id }));
            return;
        };
        match entry.child.negative_ack(concrete).await {
            Ok(()) => {
                let _ = self.unacked.remove(concrete);
                reply.send(Ok(()));
            }
            Err(err) => {
                let wrapped = self.wrap_child_error(&concrete.topic, ChildErrorKind::Operation, err);
                reply.send(Err(wrapped));
            }
        }
    }

    async fn on_acknowledge_cumulative(&mut self, id: MessageId, reply: ReplySender<Result<()>>) {
        let MessageId::Concrete(concrete) = &id else {
            reply.send(Err(Error::IllegalMessageId { message_id: id }));
            return;
        };
        let Some(entry) = self.children.get(&concrete.topic) else {
            reply.send(Err(Error::IllegalMessageId { message_id: id }));
            return;
        };
        match entry.child.ack_cumulative(concrete).await {
            Ok(()) => {
                let _ = self.unacked.remove_until(&id);
                reply.send(Ok(()));
            }
            Err(err) => {
                let wrapped = self.wrap_child_error(&concrete.topic, ChildErrorKind::Operation, err);
                reply.send(Err(wrapped));
            }
        }
    }

    async fn on_redeliver_all(&mut self, reply: ReplySender<Result<()>>) {
        let topics: Vec<CompleteTopicName> = self.children.keys().cloned().collect();
        let mut failures = Vec::new();
        for topic in &topics {
            if let Some(entry) = self.children.get(topic) {
                if let Err(err) = entry.child.redeliver_all().await {
                    failures.push(self.wrap_child_error(topic, ChildErrorKind::Operation, err));
                }
            }
        }
        if let Some(first) = failures.into_iter().next() {
            reply.send(Err(first));
            return;
        }
        self.queue.clear();
        self.unacked.clear();
        let _ = self.poller_commands.try_send(PollerCommand::RestartCompleted);
        reply.send(Ok(()));
    }

    async fn on_redeliver_unacknowledged(&mut self, ids: Vec<MessageId>, reply: ReplySender<Result<()>>) {
        if !matches!(
            self.config.subscription_type,
            crate::config::SubscriptionType::Shared | crate::config::SubscriptionType::KeyShared
        ) {
            self.on_redeliver_all(reply).await;
            return;
        }
        let mut by_topic: HashMap<CompleteTopicName, Vec<ConcreteMessageId>> = HashMap::new();
        for id in ids {
            if let MessageId::Concrete(concrete) = id {
                by_topic.entry(concrete.topic.clone()).or_default().push(concrete);
            }
        }
        let mut failures = Vec::new();
        for (topic, concretes) in &by_topic {
            if let Some(entry) = self.children.get(topic) {
                match entry.child.redeliver_unacknowledged(concretes).await {
                    Ok(()) => {
                        for id in concretes {
                            let _ = self.unacked.remove(id);
                        }
                    }
                    Err(err) => {
                        failures.push(self.wrap_child_error(topic, ChildErrorKind::Operation, err));
                    }
                }
            }
        }
        if let Some(first) = failures.into_iter().next() {
            reply.send(Err(first));
        } else {
            reply.send(Ok(()));
        }
    }

    async fn on_seek(&mut self, seek: SeekData, reply: ReplySender<Result<()>>) {
        let futures = self.children.iter().map(|(topic, entry)| {
            let seek = seek.clone();
            async move { (topic.clone(), entry.child.seek(seek).await) }
        });
        let results = join_all(futures).await;
        self.queue.clear();
        self.unacked.clear();
        let mut failures = results
            .into_iter()
            .filter_map(|(topic, result)| result.err().map(|err| self.wrap_child_error(&topic, ChildErrorKind::Operation, err)));
        if let Some(first) = failures.next() {
            reply.send(Err(first));
        } else {
            reply.send(Ok(()));
        }
    }

    async fn on_seek_with_resolver(&mut self, resolver: SeekResolver, reply: ReplySender<Result<()>>) {
        let futures = self.children.iter().map(|(topic, entry)| {
            let target = resolver(topic);
            async move { (topic.clone(), entry.child.seek(target).await) }
        });
        let results = join_all(futures).await;
        self.queue.clear();
        self.unacked.clear();
        let mut failures = results
            .into_iter()
            .filter_map(|(topic, result)| result.err().map(|err| self.wrap_child_error(&topic, ChildErrorKind::Operation, err)));
        if let Some(first) = failures.next() {
            reply.send(Err(first));
        } else {
            reply.send(Ok(()));
        }
    }

    async fn on_partition_tick(&mut self) {
        if self.connection_state.load() != ConnectionState::Ready {
            return;
        }
        let tracked: Vec<(TopicName, u32)> = self
            .partitioned_topics
            .iter()
            .map(|(topic, info)| (topic.clone(), info.partitions))
            .collect();
        for (topic, old_count) in tracked {
            let metadata = match self.lookup.get_partitioned_topic_metadata(&topic).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(%topic, error = %err, "partition tick: lookup failed");
                    continue;
                }
            };
            if metadata.partitions <= old_count {
                if metadata.partitions < old_count {
                    warn!(%topic, old_count, new_count = metadata.partitions, "partition tick: shrink refused");
                }
                continue;
            }
            let fair_share = self.config.fair_share_queue_size(self.children.len().max(1));
            let mut grown_config = self.config.clone();
            grown_config.receiver_queue_size = fair_share;
            let mut created = Vec::new();
            let mut failed = false;
            for index in old_count..metadata.partitions {
                let complete = topic.partition(index);
                match self.factory.create(complete.clone(), &grown_config).await {
                    Ok(child) => created.push((complete, child)),
                    Err(err) => {
                        warn!(%topic, error = %err, "partition tick: child creation failed");
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                for (_, child) in created {
                    let _ = child.dispose().await;
                }
                continue;
            }
            for (complete, child) in created {
                self.insert_child(complete, child);
            }
            if let Some(info) = self.partitioned_topics.get_mut(&topic) {
                info.partitions = metadata.partitions;
            }
        }
    }

    async fn on_pattern_tick(&mut self) {
        let MultiConsumerType::Pattern { namespace, pattern } = self.mode.clone() else {
            return;
        };
        let new_all: HashSet<TopicName> = match self.lookup.get_topics(&namespace, &pattern).await {
            Ok(topics) => topics.into_iter().collect(),
            Err(err) => {
                warn!(error = %err, "pattern tick: lookup failed");
                return;
            }
        };
        let added: Vec<TopicName> = new_all.difference(&self.all_topics).cloned().collect();
        let removed: Vec<TopicName> = self.all_topics.difference(&new_all).cloned().collect();

        for topic in &removed {
            let matching: Vec<CompleteTopicName> = self
                .children
                .keys()
                .filter(|complete| complete.belongs_to(topic))
                .cloned()
                .collect();
            for complete in matching {
                if let Some(child) = self.remove_child(&complete).await {
                    let _ = child.dispose().await;
                }
            }
            let _ = self.partitioned_topics.remove(topic);
        }

        for topic in &added {
            let metadata = match self.lookup.get_partitioned_topic_metadata(topic).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(%topic, error = %err, "pattern tick: lookup failed for added topic");
                    continue;
                }
            };
            let _ = self.partitioned_topics.insert(
                topic.clone(),
                ConsumerInitInfo {
                    partitions: metadata.partitions,
                },
            );
            let names = if metadata.partitions == 0 {
                vec![topic.as_complete()]
            } else {
                (0..metadata.partitions).map(|i| topic.partition(i)).collect()
            };
            for complete in names {
                match self.factory.create(complete.clone(), &self.config).await {
                    Ok(child) => self.insert_child(complete, child),
                    Err(err) => warn!(%complete, error = %err, "pattern tick: child creation failed"),
                }
            }
        }

        self.all_topics = new_all;
    }

    async fn on_get_stats(&mut self, reply: ReplySender<Result<ConsumerStats>>) {
        let mut snapshots = Vec::new();
        for (topic, entry) in &self.children {
            match entry.child.stats().await {
                Ok(stats) => snapshots.push(stats),
                Err(err) => warn!(%topic, error = %err, "get_stats: child query failed"),
            }
        }
        reply.send(Ok(crate::stats::reduce(&snapshots)));
    }

    async fn on_reconsume_later(&mut self, id: MessageId, delay: std::time::Duration, reply: ReplySender<Result<()>>) {
        let MessageId::Concrete(concrete) = &id else {
            reply.send(Err(Error::IllegalMessageId { message_id: id }));
            return;
        };
        let Some(entry) = self.children.get(&concrete.topic) else {
            reply.send(Err(Error::IllegalMessageId { message_id: id }));
            return;
        };
        match entry.child.reconsume_later(concrete, delay).await {
            Ok(()) => {
                let _ = self.unacked.remove(concrete);
                reply.send(Ok(()));
            }
            Err(err) => {
                let wrapped = self.wrap_child_error(&concrete.topic, ChildErrorKind::Operation, err);
                reply.send(Err(wrapped));
            }
        }
    }

    async fn on_reconsume_later_batch(
        &mut self,
        ids: Vec<MessageId>,
        delay: std::time::Duration,
        reply: ReplySender<Result<()>>,
    ) {
        for id in ids {
            let MessageId::Concrete(concrete) = &id else {
                reply.send(Err(Error::IllegalMessageId { message_id: id }));
                return;
            };
            let Some(entry) = self.children.get(&concrete.topic) else {
                reply.send(Err(Error::IllegalMessageId { message_id: id }));
                return;
            };
            if let Err(err) = entry.child.reconsume_later(concrete, delay).await {
                let wrapped = self.wrap_child_error(&concrete.topic, ChildErrorKind::Operation, err);
                reply.send(Err(wrapped));
                return;
            }
            let _ = self.unacked.remove(concrete);
        }
        reply.send(Ok(()));
    }

    async fn on_close(&mut self, reply: ReplySender<Result<()>>) {
        let state = self.connection_state.load();
        if matches!(state, ConnectionState::Closing | ConnectionState::Closed) {
            reply.send(Ok(()));
            return;
        }
        self.connection_state.store(ConnectionState::Closing);
        let topics: Vec<CompleteTopicName> = self.children.keys().cloned().collect();
        for topic in topics {
            if let Some(entry) = self.children.get(&topic) {
                if let Err(err) = entry.child.dispose().await {
                    warn!(%topic, error = %err, "close: child dispose failed, continuing (best-effort)");
                }
            }
        }
        self.connection_state.store(ConnectionState::Closed);
        self.stop_consumer();
        reply.send(Ok(()));
    }

    async fn on_unsubscribe(&mut self, reply: ReplySender<Result<()>>) {
        let state = self.connection_state.load();
        if matches!(state, ConnectionState::Closing | ConnectionState::Closed) {
            reply.send(Ok(()));
            return;
        }
        self.connection_state.store(ConnectionState::Closing);
        let topics: Vec<CompleteTopicName> = self.children.keys().cloned().collect();
        let mut failures = Vec::new();
        for topic in &topics {
            if let Some(entry) = self.children.get(topic) {
                if let Err(err) = entry.child.unsubscribe().await {
                    failures.push(self.wrap_child_error(topic, ChildErrorKind::Operation, err));
                }
            }
        }
        if let Some(first) = failures.into_iter().next() {
            self.connection_state.store(ConnectionState::Failed);
            self.stop_consumer();
            reply.send(Err(first));
            return;
        }
        self.connection_state.store(ConnectionState::Closed);
        self.stop_consumer();
        reply.send(Ok(()));
    }

    fn stop_consumer(&mut self) {
        self.poller_cancel.cancel();
        self.watcher_cancel.cancel();
        self.unacked.clear();
        for waiter in self.waiters.drain() {
            waiter.reply.send(Err(Error::AlreadyClosed));
        }
        for batch_waiter in self.batch_waiters.drain() {
            batch_waiter.timeout_guard.cancel();
            batch_waiter.reply.send(Err(Error::AlreadyClosed));
        }
        if let Some(hook) = self.cleanup_hook.take() {
            hook();
        }
        info!("consumer stopped");
    }
}
