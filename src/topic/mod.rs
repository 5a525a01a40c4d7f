//! Topic tokenization and validation
//!
//! Implements topic name/filter splitting and validation based on the
//! MQTT v3.1.1 and v5.0 rules for topic names and filters, including the
//! `$share/{group}/{filter}` shared-subscription prefix.

mod tokenize;

pub use tokenize::{
    tokenize_filter, tokenize_topic, TokenizedFilter, TopicError, TopicLevels, TOPIC_MAX_LEN,
};
