// SPDX-License-Identifier: Apache-2.0

//! Client-side multi-topic consumer core for a Pulsar-style messaging library.
//!
//! A [`consumer::MultiTopicConsumer`] presents one logical consumer over a set of topics that
//! may be a single partitioned topic, an explicit list of topics, or a namespace pattern. Under
//! the hood an [`actor::Actor`] owns one [`child::ChildConsumer`] per partition, merges their
//! message streams through a [`poller::Poller`]/[`task_seq::TaskSeq`] pair, and serializes every
//! public operation (receive, acknowledge, seek, stats, ...) through its mailbox.
//!
//! Brokers, wire protocols, and connection pooling are out of scope: [`child::ChildFactory`] and
//! [`lookup::BinaryLookupService`] are the seams a real client plugs into.

pub mod actor;
pub mod child;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod lookup;
pub mod message;
pub mod partition_watcher;
pub mod pattern_watcher;
pub mod poller;
pub mod queue;
pub mod stats;
pub mod stream;
pub mod task_seq;
pub mod topic;
pub mod unacked;

pub use client::ClientRegistry;
pub use config::{BatchReceivePolicy, Config, SubscriptionType};
pub use consumer::MultiTopicConsumer;
pub use error::{Error, Result};
pub use message::{ConcreteMessageId, Message, MessageId, Messages, PublishMetadata};
pub use stats::ConsumerStats;
pub use topic::{CompleteTopicName, TopicName};
