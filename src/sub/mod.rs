//! Subscription engine
//!
//! Maintains the set of client subscriptions indexed by hierarchical
//! topic filter and routes every published message to the subscribers
//! entitled to receive it. All state hangs off an explicit
//! [`SubscriptionEngine`] so multiple engines can coexist in one process.
//!
//! The engine is single-writer by construction: every operation takes
//! `&mut self` and runs to completion, so each call is atomic with
//! respect to the others. Collaborators (ACL, outbound queue, retained
//! store, persistence) are reached through [`EngineHooks`] and must not
//! re-enter the engine.

mod matcher;
#[cfg(feature = "sys-topics")]
mod sys_tree;
mod tree;

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use ahash::AHashMap;
use compact_str::CompactString;
use tracing::debug;

use crate::config::EngineConfig;
use crate::hooks::{EngineHooks, HookError};
use crate::message::StoredMessage;
use crate::protocol::{ProtocolVersion, QoS, SubscriptionOptions};
use crate::topic::{tokenize_filter, tokenize_topic, TopicError};
use tree::{upsert_leaf, ClientIndex, LeafInsert, SubNode};

/// Identity of the client a session-layer call acts for
#[derive(Debug, Clone)]
pub struct ClientRef {
    /// Client identifier
    pub id: Arc<str>,
    /// Protocol version the client connected with
    pub protocol: ProtocolVersion,
}

impl ClientRef {
    pub fn new(id: impl Into<Arc<str>>, protocol: ProtocolVersion) -> Self {
        Self {
            id: id.into(),
            protocol,
        }
    }
}

/// One decoded SUBSCRIBE entry
#[derive(Debug, Clone)]
pub struct SubscriptionRequest<'a> {
    /// Topic filter, possibly `$share/{group}/{filter}`
    pub filter: &'a str,
    /// Subscription options
    pub options: SubscriptionOptions,
    /// Subscription identifier, zero if absent
    pub identifier: u32,
}

/// Outcome of [`SubscriptionEngine::sub_add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The subscription did not exist before — the session layer should
    /// replay retained messages
    NewSubscription,
    /// The client already held this subscription; options were updated
    /// in place
    Resubscribed,
}

/// Outcome of [`SubscriptionEngine::sub_remove`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// The subscription was removed
    Removed,
    /// No such subscription existed
    NoSubscription,
}

/// Outcome of [`SubscriptionEngine::messages_queue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// At least one matching subscriber was found
    Delivered,
    /// No subscriber matched the topic
    NoSubscribers,
}

/// Engine error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed topic name or filter
    InvalidTopic(TopicError),
    /// Every deliverable subscriber failed downstream
    Delivery(HookError),
    /// The retained-message store rejected the message
    RetainStore(HookError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidTopic(e) => write!(f, "invalid topic: {}", e),
            EngineError::Delivery(e) => write!(f, "delivery failed: {}", e),
            EngineError::RetainStore(e) => write!(f, "retain store failed: {}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<TopicError> for EngineError {
    fn from(e: TopicError) -> Self {
        EngineError::InvalidTopic(e)
    }
}

/// Topic subscription engine
///
/// Owns the subscription trie and every client's subscription index.
pub struct SubscriptionEngine<H: EngineHooks> {
    root: SubNode,
    clients: AHashMap<Arc<str>, ClientIndex>,
    config: EngineConfig,
    hooks: H,
    #[cfg(feature = "sys-topics")]
    subscription_count: u64,
    #[cfg(feature = "sys-topics")]
    shared_subscription_count: u64,
}

impl<H: EngineHooks> SubscriptionEngine<H> {
    pub fn new(config: EngineConfig, hooks: H) -> Self {
        Self {
            root: SubNode::default(),
            clients: AHashMap::new(),
            config,
            hooks,
            #[cfg(feature = "sys-topics")]
            subscription_count: 0,
            #[cfg(feature = "sys-topics")]
            shared_subscription_count: 0,
        }
    }

    /// Add or update a subscription.
    ///
    /// A repeat subscribe by the same client to the same filter updates
    /// the existing leaf in place. MQTT v3.1.1 requires retained messages
    /// to be resent on every re-subscribe, so for v3.1.1 clients the
    /// result is reported as [`SubscribeOutcome::NewSubscription`] either
    /// way; v5.0 clients see [`SubscribeOutcome::Resubscribed`].
    pub fn sub_add(
        &mut self,
        client: &ClientRef,
        sub: &SubscriptionRequest<'_>,
    ) -> Result<SubscribeOutcome, EngineError> {
        let tokenized = tokenize_filter(sub.filter)?;
        let filter: Arc<str> = Arc::from(sub.filter);

        let node = self.root.find_or_create_path(&tokenized.levels);
        let insert = match tokenized.share_group {
            Some(group) => {
                let bucket = node.shared.entry(CompactString::new(group)).or_default();
                upsert_leaf(&mut bucket.subs, &client.id, &filter, sub.options, sub.identifier)
            }
            None => upsert_leaf(&mut node.subs, &client.id, &filter, sub.options, sub.identifier),
        };

        if insert == LeafInsert::Added {
            self.clients
                .entry(Arc::clone(&client.id))
                .or_default()
                .insert(Arc::clone(&filter));

            #[cfg(feature = "sys-topics")]
            {
                if tokenized.share_group.is_some() {
                    self.shared_subscription_count += 1;
                } else {
                    self.subscription_count += 1;
                    self.update_subscribed_topics(&tokenized.levels);
                }
            }

            debug!("{} subscribed to {}", client.id, filter);
            return Ok(SubscribeOutcome::NewSubscription);
        }

        debug!("{} re-subscribed to {}", client.id, filter);
        if client.protocol.replays_retained_on_resubscribe() {
            Ok(SubscribeOutcome::NewSubscription)
        } else {
            Ok(SubscribeOutcome::Resubscribed)
        }
    }

    /// Remove a subscription. Nodes emptied by the removal are pruned.
    pub fn sub_remove(
        &mut self,
        client: &ClientRef,
        filter: &str,
    ) -> Result<UnsubscribeOutcome, EngineError> {
        let tokenized = tokenize_filter(filter)?;

        let removed =
            self.root
                .remove_leaf_at(&tokenized.levels, &client.id, tokenized.share_group);
        let Some(leaf) = removed else {
            return Ok(UnsubscribeOutcome::NoSubscription);
        };

        if let Some(index) = self.clients.get_mut(&*client.id) {
            index.clear(&leaf.filter);
        }

        #[cfg(feature = "sys-topics")]
        {
            if tokenized.share_group.is_some() {
                self.shared_subscription_count -= 1;
            } else {
                self.subscription_count -= 1;
                self.update_subscribed_topics(&tokenized.levels);
            }
        }

        debug!("{} unsubscribed from {}", client.id, leaf.filter);
        Ok(UnsubscribeOutcome::Removed)
    }

    /// Route one published message to every matching subscriber.
    ///
    /// `source_id` is the publishing client, when the publish came from a
    /// client; it is what no-local subscriptions are checked against. A
    /// retained publish is handed to the retained-message store after
    /// subscriber enumeration, whether or not anyone matched.
    pub fn messages_queue(
        &mut self,
        source_id: Option<&str>,
        topic: &str,
        publish_qos: QoS,
        retain: bool,
        stored: &Arc<StoredMessage>,
    ) -> Result<RouteOutcome, EngineError> {
        let levels = tokenize_topic(topic)?;

        // Pin the message for the whole pass; the outbound queue takes
        // its own references per delivery.
        let stored = Arc::clone(stored);
        let is_sys = topic.starts_with('$');

        let mut dispatch = matcher::Dispatch {
            hooks: &mut self.hooks,
            config: &self.config,
            source_id,
            topic,
            publish_qos,
            retain,
            stored: &stored,
            found: false,
            delivered: 0,
            failed: 0,
            last_error: None,
        };
        matcher::search(&mut self.root, &levels, 0, is_sys, &mut dispatch);

        let found = dispatch.found;
        let delivered = dispatch.delivered;
        let failed = dispatch.failed;
        let last_error = dispatch.last_error.take();

        if retain {
            self.hooks
                .retain_store(topic, &stored, &levels, true)
                .map_err(EngineError::RetainStore)?;
        }

        if delivered == 0 && failed > 0 {
            let error = last_error
                .unwrap_or_else(|| HookError::Internal("delivery failed".into()));
            return Err(EngineError::Delivery(error));
        }

        if found {
            Ok(RouteOutcome::Delivered)
        } else {
            Ok(RouteOutcome::NoSubscribers)
        }
    }

    /// Drop every subscription a departing client holds and prune the
    /// paths they emptied. Idempotent; unknown clients are a no-op.
    pub fn clean_session(&mut self, client_id: &str) {
        let Some(index) = self.clients.remove(client_id) else {
            return;
        };

        for filter in index.slots.into_iter().flatten() {
            // Filters in the index were validated on subscribe
            let Ok(tokenized) = tokenize_filter(&filter) else {
                continue;
            };
            let removed =
                self.root
                    .remove_leaf_at(&tokenized.levels, client_id, tokenized.share_group);
            if removed.is_some() {
                self.hooks.subscription_deleted(client_id, &filter);

                #[cfg(feature = "sys-topics")]
                {
                    if tokenized.share_group.is_some() {
                        self.shared_subscription_count -= 1;
                    } else {
                        self.subscription_count -= 1;
                        self.update_subscribed_topics(&tokenized.levels);
                    }
                }
            }
        }

        debug!("cleaned session state for {}", client_id);
    }

    /// True when no subscription nodes exist besides the root.
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Number of subscriptions `client_id` currently holds.
    pub fn client_subscription_count(&self, client_id: &str) -> usize {
        self.clients
            .get(client_id)
            .map(|index| index.active())
            .unwrap_or(0)
    }

    /// Current number of normal subscriptions.
    #[cfg(feature = "sys-topics")]
    pub fn subscription_count(&self) -> u64 {
        self.subscription_count
    }

    /// Current number of shared-subscription memberships.
    #[cfg(feature = "sys-topics")]
    pub fn shared_subscription_count(&self) -> u64 {
        self.shared_subscription_count
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Render the subscription tree with per-leaf `(client, qos)`
    /// annotations. Diagnostic aid; sibling order is unspecified.
    pub fn tree_dump(&self) -> String {
        let mut out = String::new();
        Self::dump_node(&self.root, 0, &mut out);
        out
    }

    fn dump_node(node: &SubNode, depth: usize, out: &mut String) {
        for (topic, child) in &node.children {
            for _ in 0..depth {
                out.push_str("  ");
            }
            out.push_str(topic);
            for leaf in &child.subs {
                let _ = write!(out, " ({}, {})", leaf.client_id, leaf.options.qos as u8);
            }
            out.push('\n');
            Self::dump_node(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
impl<H: EngineHooks> SubscriptionEngine<H> {
    /// Structural invariants checked after mutations in tests: reachable
    /// nodes are non-empty, shared groups are non-empty, and the trie's
    /// leaves agree exactly with the client indexes.
    fn check_invariants(&self) {
        fn walk(node: &SubNode, is_root: bool, leaves: &mut Vec<(String, String)>) {
            assert!(is_root || !node.is_empty(), "reachable node must not be empty");
            for leaf in &node.subs {
                leaves.push((leaf.client_id.to_string(), leaf.filter.to_string()));
            }
            for bucket in node.shared.values() {
                assert!(!bucket.subs.is_empty(), "shared group must not be empty");
                for leaf in &bucket.subs {
                    leaves.push((leaf.client_id.to_string(), leaf.filter.to_string()));
                }
            }
            for child in node.children.values() {
                walk(child, false, leaves);
            }
        }

        let mut leaves = Vec::new();
        walk(&self.root, true, &mut leaves);

        let mut indexed: Vec<(String, String)> = self
            .clients
            .iter()
            .flat_map(|(id, index)| {
                index
                    .slots
                    .iter()
                    .flatten()
                    .map(move |filter| (id.to_string(), filter.to_string()))
            })
            .collect();

        leaves.sort();
        indexed.sort();
        assert_eq!(leaves, indexed, "trie leaves and client indexes must agree");
    }
}
