//! Engine configuration
//!
//! Behavior switches for the subscription engine. The struct deserializes
//! with defaults so an embedding broker can carry an `[engine]` table in
//! its own TOML configuration without spelling out every field.

use serde::Deserialize;

/// Subscription engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deliver at the subscriber's QoS instead of
    /// `min(publish QoS, subscription QoS)`
    pub upgrade_outgoing_qos: bool,
    /// Rotate a shared-subscription group even when its head subscriber
    /// was skipped by an ACL denial, so the denial consumes that
    /// subscriber's turn. When false the head keeps its turn.
    pub shared_rotate_on_deny: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upgrade_outgoing_qos: false,
            shared_rotate_on_deny: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.upgrade_outgoing_qos);
        assert!(config.shared_rotate_on_deny);
    }
}
