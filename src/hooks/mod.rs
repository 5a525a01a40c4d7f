//! Engine collaborator hooks
//!
//! The subscription engine does not parse packets, queue outbound
//! messages, or store retained state itself; it calls out through this
//! trait. Implementations must be synchronous and must not call back into
//! the engine while a hook is running: every engine operation completes
//! atomically with respect to other engine operations.

use std::fmt;
use std::sync::Arc;

use crate::message::StoredMessage;
use crate::protocol::QoS;

/// Hook error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The target client's outbound queue is full
    QueueFull,
    /// Internal error in the collaborator
    Internal(String),
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::QueueFull => write!(f, "outbound queue full"),
            HookError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for HookError {}

/// Hook result type
pub type HookResult<T> = Result<T, HookError>;

/// Kind of topic access being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclAccess {
    /// Deliver a message to a subscriber
    Read,
    /// Accept a message from a publisher
    Write,
    /// Accept a subscription request
    Subscribe,
}

/// Outcome of an ACL check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDecision {
    Allow,
    Deny,
}

/// Outcome of handing a delivery to the outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Delivery accepted
    Queued,
    /// The queue recognized the message as already pending and dropped it
    DuplicateElided,
}

/// Collaborators the engine depends on
///
/// All methods except [`mid_generate`](EngineHooks::mid_generate) have
/// default implementations that allow everything and drop deliveries,
/// which is convenient for tests and for read-only tooling built on the
/// engine.
pub trait EngineHooks {
    /// Check whether `client_id` may access `topic`.
    ///
    /// The engine calls this with [`AclAccess::Read`] once per candidate
    /// delivery. `Deny` skips the subscriber silently; an error counts as
    /// a failed delivery but does not stop enumeration of other
    /// subscribers.
    fn acl_check(
        &mut self,
        _client_id: &str,
        _topic: &str,
        _payload: &[u8],
        _qos: QoS,
        _retain: bool,
        _access: AclAccess,
    ) -> HookResult<AclDecision> {
        Ok(AclDecision::Allow)
    }

    /// Allocate the next packet identifier for `client_id`. Must be
    /// non-zero; called only for deliveries with effective QoS > 0.
    fn mid_generate(&mut self, client_id: &str) -> u16;

    /// Hand one delivery to the client's outbound queue.
    ///
    /// `mid` is zero for QoS 0 deliveries. `identifier` is the
    /// subscription identifier the subscriber attached, zero if absent.
    fn enqueue_outgoing(
        &mut self,
        _client_id: &str,
        _mid: u16,
        _qos: QoS,
        _retain: bool,
        _stored: &Arc<StoredMessage>,
        _identifier: u32,
    ) -> HookResult<EnqueueOutcome> {
        Ok(EnqueueOutcome::Queued)
    }

    /// Store `stored` as the retained message for `topic`.
    ///
    /// Called once per retained publish, after subscriber enumeration.
    /// `levels` is the tokenized topic so the store does not have to split
    /// it again. When `expire_if_empty` is set, an empty payload deletes
    /// the retained entry instead of replacing it.
    fn retain_store(
        &mut self,
        _topic: &str,
        _stored: &Arc<StoredMessage>,
        _levels: &[&str],
        _expire_if_empty: bool,
    ) -> HookResult<()> {
        Ok(())
    }

    /// A subscription was dropped during session cleanup. Persistence
    /// side-effect only; must not mutate the engine.
    fn subscription_deleted(&mut self, _client_id: &str, _filter: &str) {}
}

/// Default hooks: allow everything, drop deliveries, allocate packet
/// identifiers from a wrapping counter shared by all clients.
#[derive(Debug, Default)]
pub struct DefaultHooks {
    next_mid: u16,
}

impl EngineHooks for DefaultHooks {
    fn mid_generate(&mut self, _client_id: &str) -> u16 {
        self.next_mid = self.next_mid.wrapping_add(1);
        if self.next_mid == 0 {
            self.next_mid = 1;
        }
        self.next_mid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mid_generation_skips_zero() {
        let mut hooks = DefaultHooks::default();
        let first = hooks.mid_generate("c1");
        assert_ne!(first, 0);

        hooks.next_mid = u16::MAX;
        assert_eq!(hooks.mid_generate("c1"), 1);
    }
}
