//! Stored message shared across a routing pass
//!
//! A published message is stored once and handed to the engine behind an
//! `Arc`; the engine clones the `Arc` for the duration of one routing pass
//! so the payload cannot be dropped while subscribers are still being
//! enumerated. The outbound queue keeps its own clones per delivery.

use std::sync::Arc;

use bytes::Bytes;

use crate::protocol::QoS;

/// An immutable published message as seen by the subscription engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Topic the message was published to
    pub topic: Arc<str>,
    /// Message payload
    pub payload: Bytes,
    /// QoS the publisher used
    pub qos: QoS,
    /// Retain flag the publisher set
    pub retain: bool,
}

impl StoredMessage {
    pub fn new(topic: impl Into<Arc<str>>, payload: Bytes, qos: QoS, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos,
            retain,
        }
    }
}
