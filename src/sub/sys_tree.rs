//! `$SYS` subscription-count publishing
//!
//! Whenever a normal leaf is added to or removed from a node, the count
//! of normal subscribers at that node is published as a QoS-0 retained
//! message under `$SYS/broker/subscribed_topics/<topic-path>`, so
//! monitoring clients can watch subscription fan-in per topic.

use std::sync::Arc;

use bytes::Bytes;

use super::SubscriptionEngine;
use crate::hooks::EngineHooks;
use crate::message::StoredMessage;
use crate::protocol::QoS;

const SUBSCRIBED_TOPICS_PREFIX: &str = "$SYS/broker/subscribed_topics";

impl<H: EngineHooks> SubscriptionEngine<H> {
    /// Publish the current normal-subscriber count of the node at
    /// `levels`. The node may already have been pruned, in which case the
    /// count is zero. Paths containing a wildcard level do not form a
    /// publishable topic name; the failed publish is dropped.
    pub(crate) fn update_subscribed_topics(&mut self, levels: &[&str]) {
        let count = self
            .root
            .find_path(levels)
            .map(|node| node.subs.len())
            .unwrap_or(0);

        let mut topic = String::with_capacity(
            SUBSCRIBED_TOPICS_PREFIX.len() + levels.iter().map(|l| l.len() + 1).sum::<usize>(),
        );
        topic.push_str(SUBSCRIBED_TOPICS_PREFIX);
        for level in levels {
            topic.push('/');
            topic.push_str(level);
        }

        let stored = Arc::new(StoredMessage::new(
            topic,
            Bytes::from(count.to_string()),
            QoS::AtMostOnce,
            true,
        ));
        let topic = Arc::clone(&stored.topic);
        let _ = self.messages_queue(None, &topic, QoS::AtMostOnce, true, &stored);
    }
}
