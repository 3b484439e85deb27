// SPDX-License-Identifier: Apache-2.0

//! Errors for the multi-topic consumer.
//!
//! Important note: it is important not to use `!Send` data types in errors so these can be
//! returned from tasks spawned onto a multi-threaded runtime.

use crate::message::MessageId;
use crate::topic::CompleteTopicName;
use std::fmt;

/// Formats the source chain of an error into a single display string, preserving the chain
/// without holding on to the original (possibly non-`'static`/non-`Send`) error object.
#[must_use]
pub fn format_error_sources(error: &(dyn std::error::Error + 'static)) -> String {
    let mut segments = Vec::new();
    let mut current = error.source();
    while let Some(err) = current {
        let msg = err.to_string();
        if !msg.is_empty() {
            segments.push(msg);
        }
        current = err.source();
    }
    if segments.is_empty() {
        String::new()
    } else {
        format!(" (caused by: {})", segments.join(" -> "))
    }
}

/// High-level classification of a child-consumer failure, for log/metric labelling.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChildErrorKind {
    /// Failed while building/initializing the child.
    Init,
    /// Failed performing an ack, nack, seek, or redeliver.
    Operation,
    /// Failed while disposing of the child.
    Dispose,
}

impl fmt::Display for ChildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChildErrorKind::Init => "init",
            ChildErrorKind::Operation => "operation",
            ChildErrorKind::Dispose => "dispose",
        };
        write!(f, "{label}")
    }
}

/// All errors the multi-topic consumer can surface to a caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The consumer has already transitioned to `Closing`/`Closed`; the operation is a no-op.
    #[error("the consumer is already closed")]
    AlreadyClosed,

    /// The caller's `CancellationToken` fired before or while the request was pending.
    #[error("the operation was cancelled")]
    OperationCancelled,

    /// `seek(MessageId)` was called with an id other than `Earliest`/`Latest`.
    #[error(
        "a multi-topic consumer only accepts Earliest/Latest as a seek target, got {message_id:?}"
    )]
    IllegalMessageId {
        /// The rejected id.
        message_id: MessageId,
    },

    /// `reconsume_later` was called without `Config::retry_enable`.
    #[error("reconsume_later requires Config::retry_enable = true")]
    RetryDisabled,

    /// `get_last_message_id` is inherently unsupported across a multi-topic view.
    #[error("get_last_message_id is not supported on a multi-topic consumer")]
    NotSupported,

    /// A child consumer's operation (ack, seek, redeliver, ...) failed.
    #[error("operation on child topic {topic} failed ({kind}): {reason}{source_detail}")]
    ChildOperationFailed {
        /// The child topic the failing operation targeted.
        topic: CompleteTopicName,
        /// What kind of child call failed.
        kind: ChildErrorKind,
        /// The child's error message.
        reason: String,
        /// Pre-formatted source chain, or empty.
        source_detail: String,
    },

    /// `Init` failed: one or more children could not be created. Terminal — the consumer
    /// transitions to `Failed` and is not usable afterwards.
    #[error("initialization failed: {0}")]
    InitFailed(String),

    /// A lookup-service call failed. Only ever logged by background tick handlers; never
    /// returned from a user-facing call.
    #[error("lookup failed: {0}")]
    LookupFailed(String),

    /// The actor's mailbox or a reply channel failed — only possible while the consumer is
    /// tearing down.
    #[error("internal channel error: {0}")]
    Channel(String),
}

impl Error {
    /// Returns the name of the error variant, for log/metric labelling.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Error::AlreadyClosed => "AlreadyClosed",
            Error::OperationCancelled => "OperationCancelled",
            Error::IllegalMessageId { .. } => "IllegalMessageId",
            Error::RetryDisabled => "RetryDisabled",
            Error::NotSupported => "NotSupported",
            Error::ChildOperationFailed { .. } => "ChildOperationFailed",
            Error::InitFailed(_) => "InitFailed",
            Error::LookupFailed(_) => "LookupFailed",
            Error::Channel(_) => "Channel",
        }
    }
}

impl<T> From<mtc_channel::error::SendError<T>> for Error {
    fn from(value: mtc_channel::error::SendError<T>) -> Self {
        Error::Channel(value.to_string())
    }
}

impl From<mtc_channel::error::RecvError> for Error {
    fn from(value: mtc_channel::error::RecvError) -> Self {
        Error::Channel(value.to_string())
    }
}

impl From<mtc_channel::error::ReplyCanceled> for Error {
    fn from(value: mtc_channel::error::ReplyCanceled) -> Self {
        Error::Channel(value.to_string())
    }
}

/// Convenience alias for results returned by the consumer's public API.
pub type Result<T> = std::result::Result<T, Error>;
