// SPDX-License-Identifier: Apache-2.0

//! Channel primitives used to wire the multi-topic consumer actor to its callers and
//! background tasks: a bounded mailbox for posting events in arrival order, and one-shot
//! reply channels for completing a single pending request.

/// Error types shared by the mailbox and reply channel.
pub mod error;
/// Bounded, multi-producer single-consumer mailbox.
pub mod mailbox;
/// One-shot reply channel paired with a mailbox event.
pub mod reply;

pub use error::{ReplyCanceled, RecvError, SendError};
pub use mailbox::{Receiver, Sender, mailbox};
pub use reply::{ReplyReceiver, ReplySender, reply_channel};
