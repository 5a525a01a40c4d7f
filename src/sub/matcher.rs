//! Publish matching and delivery
//!
//! Depth-first descent over the subscription trie with literal, `+`, and
//! `#` branches taken independently; a match on one branch never preempts
//! the others. Every terminal hit runs the per-leaf delivery decision:
//! no-local, ACL, QoS resolution, packet-identifier allocation,
//! retain-as-published, then the outbound enqueue hook. Shared groups
//! deliver to the front member only and rotate head-to-tail.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::tree::{SubLeaf, SubNode};
use crate::config::EngineConfig;
use crate::hooks::{AclAccess, AclDecision, EngineHooks, HookError};
use crate::message::StoredMessage;
use crate::protocol::QoS;

/// One routing pass: the publish being matched plus delivery bookkeeping.
pub(crate) struct Dispatch<'a, H: EngineHooks> {
    pub hooks: &'a mut H,
    pub config: &'a EngineConfig,
    /// Publishing client, if the publish originated from a client
    pub source_id: Option<&'a str>,
    pub topic: &'a str,
    pub publish_qos: QoS,
    pub retain: bool,
    pub stored: &'a Arc<StoredMessage>,
    /// At least one matched node held subscribers
    pub found: bool,
    /// Deliveries accepted by the outbound queue
    pub delivered: u32,
    /// Deliverable leaves that failed downstream
    pub failed: u32,
    pub last_error: Option<HookError>,
}

enum SendOutcome {
    Sent,
    Denied,
    Failed,
}

/// Recursive descent from `node` with the topic suffix starting at
/// `index`. `is_sys` marks a topic whose first level begins with `$`;
/// such topics are never matched by `+` or `#` at the root level.
pub(crate) fn search<H: EngineHooks>(
    node: &mut SubNode,
    levels: &[&str],
    index: usize,
    is_sys: bool,
    dispatch: &mut Dispatch<'_, H>,
) {
    if index < levels.len() {
        if let Some(child) = node.children.get_mut(levels[index]) {
            search(child, levels, index + 1, is_sys, dispatch);
        }
        if !(is_sys && index == 0) {
            if let Some(child) = node.children.get_mut("+") {
                search(child, levels, index + 1, is_sys, dispatch);
            }
        }
    }

    // "#" matches the whole remaining suffix, including an empty one, so
    // a "a/#" subscriber also receives publishes to "a" itself.
    if !(is_sys && index == 0) {
        if let Some(child) = node.children.get_mut("#") {
            if child.children.is_empty() {
                process(child, dispatch);
            }
        }
    }

    if index == levels.len() {
        process(node, dispatch);
    }
}

/// Deliver from one matched terminal node: each shared group to its
/// front member, then every normal leaf.
fn process<H: EngineHooks>(node: &mut SubNode, dispatch: &mut Dispatch<'_, H>) {
    for bucket in node.shared.values_mut() {
        dispatch.found = true;
        let Some(head) = bucket.subs.front() else {
            continue;
        };
        let outcome = send_leaf(head, dispatch);
        let rotate = match outcome {
            SendOutcome::Denied => dispatch.config.shared_rotate_on_deny,
            _ => true,
        };
        record(dispatch, outcome);
        if rotate {
            if let Some(leaf) = bucket.subs.pop_front() {
                bucket.subs.push_back(leaf);
            }
        }
    }

    if !node.subs.is_empty() {
        dispatch.found = true;
    }
    for leaf in node.subs.iter() {
        if leaf.options.no_local && dispatch.source_id == Some(&*leaf.client_id) {
            trace!("no-local: not echoing {} back to {}", dispatch.topic, leaf.client_id);
            continue;
        }
        let outcome = send_leaf(leaf, dispatch);
        record(dispatch, outcome);
    }
}

fn record<H: EngineHooks>(dispatch: &mut Dispatch<'_, H>, outcome: SendOutcome) {
    match outcome {
        SendOutcome::Sent => dispatch.delivered += 1,
        SendOutcome::Failed => dispatch.failed += 1,
        SendOutcome::Denied => {}
    }
}

/// Run the delivery decision for one leaf and hand the result to the
/// outbound queue.
fn send_leaf<H: EngineHooks>(leaf: &SubLeaf, dispatch: &mut Dispatch<'_, H>) -> SendOutcome {
    match dispatch.hooks.acl_check(
        &leaf.client_id,
        dispatch.topic,
        &dispatch.stored.payload,
        dispatch.stored.qos,
        dispatch.stored.retain,
        AclAccess::Read,
    ) {
        Ok(AclDecision::Allow) => {}
        Ok(AclDecision::Deny) => {
            trace!("delivery of {} to {} denied by ACL", dispatch.topic, leaf.client_id);
            return SendOutcome::Denied;
        }
        Err(e) => {
            warn!("ACL check error for {}: {}", leaf.client_id, e);
            dispatch.last_error = Some(e);
            return SendOutcome::Failed;
        }
    }

    let client_qos = leaf.options.qos;
    let qos = if dispatch.config.upgrade_outgoing_qos {
        client_qos
    } else {
        dispatch.publish_qos.min(client_qos)
    };
    let mid = if qos == QoS::AtMostOnce {
        0
    } else {
        dispatch.hooks.mid_generate(&leaf.client_id)
    };
    let retain = if leaf.options.retain_as_published {
        dispatch.retain
    } else {
        false
    };

    match dispatch
        .hooks
        .enqueue_outgoing(&leaf.client_id, mid, qos, retain, dispatch.stored, leaf.identifier)
    {
        Ok(_) => SendOutcome::Sent,
        Err(e) => {
            debug!("enqueue to {} failed: {}", leaf.client_id, e);
            dispatch.last_error = Some(e);
            SendOutcome::Failed
        }
    }
}
