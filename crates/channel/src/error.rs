// SPDX-License-Identifier: Apache-2.0

//! Errors for the channel wrappers.
//!
//! Important note: it is important not to use `!Send` data types in errors (e.g. avoid using
//! `Rc`) so that these errors can be propagated out of the actor in both `Send` and non-`Send`
//! contexts.

/// Errors that can occur sending a message into a channel.
#[derive(thiserror::Error, Debug)]
pub enum SendError<T> {
    /// The channel is at capacity and the message could not be sent.
    #[error("channel is full and the message could not be sent")]
    Full(T),

    /// The channel is closed (no receiver remains) and the message could not be sent.
    #[error("channel is closed and the message could not be sent")]
    Closed(T),
}

impl<T> SendError<T> {
    /// Returns the value that could not be sent, regardless of which variant occurred.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(t) | Self::Closed(t) => t,
        }
    }
}

/// Errors that can occur receiving a message from a channel.
#[derive(thiserror::Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecvError {
    /// The channel is closed and no further messages will arrive.
    #[error("the channel is closed")]
    Closed,
}

/// Errors that can occur awaiting a one-shot reply.
#[derive(thiserror::Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("the reply sender was dropped before a reply was sent")]
pub struct ReplyCanceled;
