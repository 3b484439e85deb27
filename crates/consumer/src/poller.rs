// SPDX-License-Identifier: Apache-2.0

//! The Poller: a background task that pulls from the dynamic [`TaskSeq`] merge and hands
//! each result to the Core Actor as a `MessageReceived` event, pacing itself on the actor's
//! reply.

use crate::actor::Event;
use crate::stream::Stream;
use crate::task_seq::TaskSeq;
use crate::topic::CompleteTopicName;
use mtc_channel::mailbox::{Receiver, Sender};
use mtc_channel::reply::reply_channel;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// A command posted by the Core Actor to mutate the Poller's child set. The actor owns the
/// child table; the Poller is the only task allowed to call `TaskSeq::next`, so membership
/// changes are relayed rather than applied directly.
pub enum PollerCommand {
    /// Arms a newly created child's Stream.
    AddChild(Arc<Stream>),
    /// Detaches a child's Stream; any in-flight read for it is discarded.
    RemoveChild(CompleteTopicName),
    /// Re-arms every currently idle child (after a global redeliver/seek).
    RestartCompleted,
}

/// Cancellable task pulling from the merged child streams and posting events to the Core.
pub struct Poller {
    task_seq: TaskSeq,
    commands: Receiver<PollerCommand>,
    core_mailbox: Sender<Event>,
    cancel: CancellationToken,
}

impl Poller {
    /// Builds a Poller. `cancel` is owned by the Core, which trips it as part of
    /// `stopConsumer`.
    #[must_use]
    pub fn new(
        commands: Receiver<PollerCommand>,
        core_mailbox: Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task_seq: TaskSeq::new(),
            commands,
            core_mailbox,
            cancel,
        }
    }

    /// Runs until cancelled or the Core's mailbox is gone. Never emits `MessageReceived`
    /// after the cancellation token trips.
    pub async fn run(mut self) {
        loop {
            let has_children = !self.task_seq.is_empty();
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("poller cancelled, stopping");
                    break;
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Ok(PollerCommand::AddChild(stream)) => self.task_seq.add(stream),
                        Ok(PollerCommand::RemoveChild(topic)) => {
                            let _ = self.task_seq.remove(&topic);
                        }
                        Ok(PollerCommand::RestartCompleted) => self.task_seq.restart_completed(),
                        Err(_) => {
                            debug!("poller command channel closed, stopping");
                            break;
                        }
                    }
                }
                next = self.task_seq.next(), if has_children => {
                    let Some((topic, result)) = next else { continue };
                    trace!(%topic, "poller pulled a message, posting to core");
                    let (reply_tx, reply_rx) = reply_channel();
                    let event = Event::MessageReceived {
                        topic,
                        message: result,
                        reply: reply_tx,
                    };
                    if self.core_mailbox.send(event).await.is_err() {
                        debug!("core mailbox closed, stopping poller");
                        break;
                    }
                    // Backpressure: the core withholds this reply until the queue drains
                    // below the resume threshold. A cancelled reply means the core is
                    // tearing down; either way we stop waiting and loop back to the
                    // cancellation check.
                    let _ = reply_rx.recv().await;
                }
            }
        }
    }
}
