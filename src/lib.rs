//! DriftMQ - topic subscription and routing engine for MQTT brokers
//!
//! The core of an MQTT v3.1.1/v5.0 broker's publish/subscribe path:
//! a hierarchical subscription trie with `+`/`#` wildcard matching,
//! shared-subscription groups with head-to-tail rotation, per-delivery
//! QoS/no-local/retain-as-published resolution, and incremental pruning
//! of emptied tree paths.
//!
//! Transport, packet codecs, session persistence, the outbound queue and
//! the retained-message store live in the embedding broker; the engine
//! reaches them through the [`EngineHooks`] trait.

pub mod config;
pub mod hooks;
pub mod message;
pub mod protocol;
pub mod sub;
pub mod topic;

pub use config::EngineConfig;
pub use hooks::{
    AclAccess, AclDecision, DefaultHooks, EngineHooks, EnqueueOutcome, HookError, HookResult,
};
pub use message::StoredMessage;
pub use protocol::{ProtocolVersion, QoS, RetainHandling, SubscriptionOptions};
pub use sub::{
    ClientRef, EngineError, RouteOutcome, SubscribeOutcome, SubscriptionEngine,
    SubscriptionRequest, UnsubscribeOutcome,
};
pub use topic::{tokenize_filter, tokenize_topic, TokenizedFilter, TopicError};
