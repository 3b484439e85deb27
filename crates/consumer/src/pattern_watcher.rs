// SPDX-License-Identifier: Apache-2.0

//! Pattern Watcher: posts `PatternTickTime` on a fixed interval so the Core Actor can diff
//! the discovered topic set against the configured pattern.

use crate::actor::Event;
use mtc_channel::mailbox::Sender;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Periodic task driving the Core Actor's pattern add/remove diff. Active only in pattern
/// mode.
pub struct PatternWatcher {
    interval: Duration,
    mailbox: Sender<Event>,
    cancel: CancellationToken,
}

impl PatternWatcher {
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
                    debug!("pattern watcher cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if self.mailbox.send(Event::PatternTickTime).await.is_err() {
                        debug!("core mailbox closed, stopping pattern watcher");
                        break;
                    }
                }
            }
        }
    }
}
