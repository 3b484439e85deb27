// SPDX-License-Identifier: Apache-2.0

//! Aggregated consumer statistics: per-child counters summed, `IntervalDuration` averaged.

use crate::child::ChildStats;
use std::time::Duration;

/// Statistics reduced across every child of a multi-topic consumer.
#[derive(Debug, Clone, Default)]
pub struct ConsumerStats {
    /// Sum of messages received across children.
    pub num_msgs_received: u64,
    /// Sum of payload bytes received across children.
    pub num_bytes_received: u64,
    /// Sum of successful acknowledgements across children.
    pub num_acks_sent: u64,
    /// Sum of failed acknowledgements across children.
    pub num_acks_failed: u64,
    /// Sum of failed receive attempts across children.
    pub num_receive_failed: u64,
    /// Sum of redelivered messages across children.
    pub num_msgs_redelivered: u64,
    /// Average reporting interval across children (zero when there are none).
    pub interval_duration: Duration,
}

/// Reduces per-child snapshots into one aggregate: counters sum, `interval_duration` averages.
#[must_use]
pub fn reduce(children: &[ChildStats]) -> ConsumerStats {
    let mut out = ConsumerStats::default();
    if children.is_empty() {
        return out;
    }
    let mut total_interval = Duration::ZERO;
    for child in children {
        out.num_msgs_received += child.num_msgs_received;
        out.num_bytes_received += child.num_bytes_received;
        out.num_acks_sent += child.num_acks_sent;
        out.num_acks_failed += child.num_acks_failed;
        out.num_receive_failed += child.num_receive_failed;
        out.num_msgs_redelivered += child.num_msgs_redelivered;
        total_interval += child.interval_duration;
    }
    out.interval_duration = total_interval / u32::try_from(children.len()).unwrap_or(u32::MAX);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reduces_to_default() {
        let out = reduce(&[]);
        assert_eq!(out.num_msgs_received, 0);
        assert_eq!(out.interval_duration, Duration::ZERO);
    }

    #[test]
    fn sums_counters_and_averages_interval() {
        let children = vec![
            ChildStats {
                num_msgs_received: 10,
                num_bytes_received: 100,
                interval_duration: Duration::from_secs(10),
                ..ChildStats::default()
            },
            ChildStats {
                num_msgs_received: 20,
                num_bytes_received: 200,
                interval_duration: Duration::from_secs(20),
                ..ChildStats::default()
            },
        ];
        let out = reduce(&children);
        assert_eq!(out.num_msgs_received, 30);
        assert_eq!(out.num_bytes_received, 300);
        assert_eq!(out.interval_duration, Duration::from_secs(15));
    }
}
