// SPDX-License-Identifier: Apache-2.0

//! Partition Watcher: posts `PartitionTickTime` on a fixed interval so the Core Actor can
//! check tracked partitioned topics for growth.

use crate::actor::Event;
use mtc_channel::mailbox::Sender;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Periodic task driving the Core Actor's partition-growth checks. Active only when
/// `Config::auto_update_partitions` is set.
pub struct PartitionWatcher {
    interval: Duration,
    mailbox: Sender<Event>,
    cancel: CancellationToken,
}

impl PartitionWatcher {
    /// Builds a watcher that ticks every `interval`, posting to `mailbox` until `cancel`
    /// trips.
    #[must_use]
    pub fn new(interval: Duration, mailbox: Sender<Event>, cancel: CancellationToken) -> Self {
        Self {
            interval,
            mailbox,
            cancel,
        }
    }

    /// Runs until cancelled or the Core's mailbox closes.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("partition watcher cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if self.mailbox.send(Event::PartitionTickTime).await.is_err() {
                        debug!("core mailbox closed, stopping partition watcher");
                        break;
                    }
                }
            }
        }
    }
}
