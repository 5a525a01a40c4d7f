//! Subscription trie storage
//!
//! One node per topic level; children own their subtrees. Wildcard levels
//! are stored as ordinary child keys named `"+"` and `"#"` and are given
//! meaning only by the matcher, never by structural lookup. Leaf
//! sequences keep insertion order; shared groups rotate head-to-tail on
//! dispatch, so both use a deque.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap;
use compact_str::CompactString;

use crate::protocol::SubscriptionOptions;

/// A single (client, filter) subscription record at its terminal node
#[derive(Debug)]
pub(crate) struct SubLeaf {
    /// Owning client
    pub client_id: Arc<str>,
    /// Full filter text as subscribed, including any `$share/` prefix
    pub filter: Arc<str>,
    /// Subscription options
    pub options: SubscriptionOptions,
    /// Subscription identifier, zero if absent
    pub identifier: u32,
}

/// One `$share/{group}` bucket on a node
#[derive(Debug, Default)]
pub(crate) struct SharedGroup {
    /// Members in rotation order; the front is next to receive
    pub subs: VecDeque<SubLeaf>,
}

/// Trie node for one topic level
#[derive(Debug, Default)]
pub(crate) struct SubNode {
    /// Child nodes keyed by level string
    pub children: AHashMap<CompactString, SubNode>,
    /// Normal subscriptions terminating at this node
    pub subs: VecDeque<SubLeaf>,
    /// Shared-subscription groups terminating at this node
    pub shared: AHashMap<CompactString, SharedGroup>,
}

/// Outcome of inserting a leaf into a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeafInsert {
    /// A new leaf was appended
    Added,
    /// The client already held this subscription; options were updated
    Existed,
}

impl SubNode {
    /// A node with nothing on it may be pruned from its parent
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty() && self.shared.is_empty() && self.children.is_empty()
    }

    /// Walk from this node along `levels`, creating missing children.
    pub fn find_or_create_path(&mut self, levels: &[&str]) -> &mut SubNode {
        let mut node = self;
        for level in levels {
            node = node
                .children
                .entry(CompactString::new(level))
                .or_default();
        }
        node
    }

    /// Walk along `levels` without creating anything.
    pub fn find_path(&self, levels: &[&str]) -> Option<&SubNode> {
        let mut node = self;
        for level in levels {
            node = node.children.get(*level)?;
        }
        Some(node)
    }

    /// Remove the leaf owned by `client_id` at the end of `levels`, from
    /// the named shared group or from the normal sequence. Nodes emptied
    /// by the removal are pruned while the walk unwinds; the caller's
    /// node (normally the root) is never pruned.
    pub fn remove_leaf_at(
        &mut self,
        levels: &[&str],
        client_id: &str,
        share_group: Option<&str>,
    ) -> Option<SubLeaf> {
        match levels.split_first() {
            Some((first, rest)) => {
                let child = self.children.get_mut(*first)?;
                let removed = child.remove_leaf_at(rest, client_id, share_group);
                if child.is_empty() {
                    self.children.remove(*first);
                }
                removed
            }
            None => match share_group {
                Some(group) => {
                    let bucket = self.shared.get_mut(group)?;
                    let removed = remove_leaf(&mut bucket.subs, client_id);
                    if bucket.subs.is_empty() {
                        self.shared.remove(group);
                    }
                    removed
                }
                None => remove_leaf(&mut self.subs, client_id),
            },
        }
    }
}

/// Insert or update a leaf in a sequence. A client holds at most one
/// leaf per sequence; a repeat subscribe overwrites the options and the
/// identifier in place and does not change the client's position.
pub(crate) fn upsert_leaf(
    subs: &mut VecDeque<SubLeaf>,
    client_id: &Arc<str>,
    filter: &Arc<str>,
    options: SubscriptionOptions,
    identifier: u32,
) -> LeafInsert {
    for leaf in subs.iter_mut() {
        if leaf.client_id == *client_id {
            leaf.options = options;
            leaf.identifier = identifier;
            return LeafInsert::Existed;
        }
    }
    subs.push_back(SubLeaf {
        client_id: Arc::clone(client_id),
        filter: Arc::clone(filter),
        options,
        identifier,
    });
    LeafInsert::Added
}

/// Unlink and return the leaf owned by `client_id`, if any.
pub(crate) fn remove_leaf(subs: &mut VecDeque<SubLeaf>, client_id: &str) -> Option<SubLeaf> {
    let pos = subs.iter().position(|leaf| &*leaf.client_id == client_id)?;
    subs.remove(pos)
}

/// Per-client list of held subscriptions, by full filter text.
///
/// Slots are sparse: an unsubscribe leaves a hole that the next subscribe
/// reuses before the vector grows. This is the authoritative enumeration
/// used to drop everything a client holds when its session ends.
#[derive(Debug, Default)]
pub(crate) struct ClientIndex {
    pub slots: Vec<Option<Arc<str>>>,
}

impl ClientIndex {
    /// Record a held filter in the first free slot.
    pub fn insert(&mut self, filter: Arc<str>) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(filter);
        } else {
            self.slots.push(Some(filter));
        }
    }

    /// Free the slot holding `filter`. Returns false if absent.
    pub fn clear(&mut self, filter: &str) -> bool {
        for slot in self.slots.iter_mut() {
            if slot.as_deref() == Some(filter) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Number of occupied slots.
    pub fn active(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
