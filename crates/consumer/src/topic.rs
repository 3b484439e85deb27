// SPDX-License-Identifier: Apache-2.0

//! Topic name newtypes.
//!
//! A [`TopicName`] is the logical topic the caller subscribed to, before any partition
//! expansion. A [`CompleteTopicName`] is the fully qualified name a child consumer actually
//! talks to, including any `-partition-N` suffix.

use std::fmt;

/// A logical topic name, as the caller subscribed to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicName(String);

impl TopicName {
    /// Builds the complete name of the `index`-th partition of this topic.
    #[must_use]
    pub fn partition(&self, index: u32) -> CompleteTopicName {
        CompleteTopicName(format!("{}-partition-{index}", self.0))
    }

    /// Returns this topic as a [`CompleteTopicName`], for non-partitioned subscriptions.
    #[must_use]
    pub fn as_complete(&self) -> CompleteTopicName {
        CompleteTopicName(self.0.clone())
    }

    /// Borrows the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TopicName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TopicName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully qualified topic name, including any `-partition-N` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompleteTopicName(String);

impl CompleteTopicName {
    /// Borrows the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this name is the `-partition-N` child of `logical`, for any `N`, or
    /// is `logical` itself (the non-partitioned case).
    #[must_use]
    pub fn belongs_to(&self, logical: &TopicName) -> bool {
        if self.0 == logical.as_str() {
            return true;
        }
        self.0
            .strip_prefix(logical.as_str())
            .and_then(|rest| rest.strip_prefix("-partition-"))
            .is_some_and(|idx| idx.parse::<u32>().is_ok())
    }
}

impl From<&str> for CompleteTopicName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for CompleteTopicName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CompleteTopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_suffix_round_trips() {
        let topic = TopicName::from("persistent://tnt/ns/t");
        let p2 = topic.partition(2);
        assert_eq!(p2.as_str(), "persistent://tnt/ns/t-partition-2");
        assert!(p2.belongs_to(&topic));
    }

    #[test]
    fn non_partitioned_topic_belongs_to_itself() {
        let topic = TopicName::from("persistent://tnt/ns/t");
        assert!(topic.as_complete().belongs_to(&topic));
    }

    #[test]
    fn unrelated_topic_does_not_belong() {
        let t1 = TopicName::from("persistent://tnt/ns/t1");
        let t2 = TopicName::from("persistent://tnt/ns/t2");
        assert!(!t2.partition(0).belongs_to(&t1));
    }
}
