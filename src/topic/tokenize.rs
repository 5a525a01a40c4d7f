//! Topic name and filter tokenization
//!
//! Key rules:
//! - Topic names MUST NOT contain wildcards (+ or #)
//! - Topic filters MAY contain wildcards
//! - Multi-level wildcard (#) must occupy an entire level and be last
//! - Single-level wildcard (+) must occupy an entire level
//! - `$share/{group}/{filter}` marks a shared subscription; the group
//!   must be non-empty and free of `/`, `+`, `#`
//! - Empty levels are significant: `a//b` has three levels
//! - Topics starting with $ are system topics and have special matching
//!   rules in the subscription trie, not here

use std::fmt;

use smallvec::SmallVec;

/// Maximum byte length of a topic name or filter
pub const TOPIC_MAX_LEN: usize = 65535;

/// Tokenized level list; typical topics stay under 8 levels
pub type TopicLevels<'a> = SmallVec<[&'a str; 8]>;

/// Reasons a topic name or filter fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    /// Empty topic or filter
    Empty,
    /// Topic or filter exceeds 65535 bytes
    TooLong,
    /// NUL character in topic or filter
    NulCharacter,
    /// `+` or `#` mixed with other characters in one level
    WildcardMixedWithText,
    /// `#` in a position other than the final level
    MultiLevelNotLast,
    /// Wildcard in a publish topic name
    WildcardInTopicName,
    /// `$share` group empty, missing, or containing `/`, `+`, `#`
    SharedGroupInvalid,
    /// `$share/{group}/` with no filter after the group
    SharedFilterEmpty,
    /// `$share/` prefix on a publish topic name
    SharedPrefixInTopicName,
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "topic cannot be empty"),
            Self::TooLong => write!(f, "topic exceeds maximum length"),
            Self::NulCharacter => write!(f, "topic cannot contain null character"),
            Self::WildcardMixedWithText => write!(f, "wildcard must occupy entire level"),
            Self::MultiLevelNotLast => write!(f, "multi-level wildcard must be last level"),
            Self::WildcardInTopicName => write!(f, "topic name cannot contain wildcards"),
            Self::SharedGroupInvalid => write!(f, "invalid shared subscription group"),
            Self::SharedFilterEmpty => write!(f, "shared subscription filter cannot be empty"),
            Self::SharedPrefixInTopicName => {
                write!(f, "topic name cannot use the $share prefix")
            }
        }
    }
}

impl std::error::Error for TopicError {}

/// A subscription filter split into levels, with the shared-subscription
/// group extracted when present. Levels borrow from the input filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedFilter<'a> {
    /// Effective filter levels (the `$share/{group}/` prefix stripped)
    pub levels: TopicLevels<'a>,
    /// Shared-subscription group, if the filter carried one
    pub share_group: Option<&'a str>,
}

/// Tokenize and validate a subscription filter.
pub fn tokenize_filter(filter: &str) -> Result<TokenizedFilter<'_>, TopicError> {
    if filter.is_empty() {
        return Err(TopicError::Empty);
    }
    if filter.len() > TOPIC_MAX_LEN {
        return Err(TopicError::TooLong);
    }
    if filter.contains('\0') {
        return Err(TopicError::NulCharacter);
    }

    let (effective, share_group) = match filter.strip_prefix("$share/") {
        Some(rest) => {
            let slash = rest.find('/').ok_or(TopicError::SharedGroupInvalid)?;
            let group = &rest[..slash];
            if group.is_empty() || group.contains('+') || group.contains('#') {
                return Err(TopicError::SharedGroupInvalid);
            }
            let effective = &rest[slash + 1..];
            if effective.is_empty() {
                return Err(TopicError::SharedFilterEmpty);
            }
            (effective, Some(group))
        }
        None => (filter, None),
    };

    let levels: TopicLevels<'_> = effective.split('/').collect();

    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" {
                return Err(TopicError::WildcardMixedWithText);
            }
            if i != levels.len() - 1 {
                return Err(TopicError::MultiLevelNotLast);
            }
        }
        if level.contains('+') && *level != "+" {
            return Err(TopicError::WildcardMixedWithText);
        }
    }

    Ok(TokenizedFilter {
        levels,
        share_group,
    })
}

/// Tokenize and validate a publish topic name.
pub fn tokenize_topic(topic: &str) -> Result<TopicLevels<'_>, TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.len() > TOPIC_MAX_LEN {
        return Err(TopicError::TooLong);
    }
    if topic.contains('\0') {
        return Err(TopicError::NulCharacter);
    }
    if topic.contains('+') || topic.contains('#') {
        return Err(TopicError::WildcardInTopicName);
    }
    if topic.starts_with("$share/") {
        return Err(TopicError::SharedPrefixInTopicName);
    }

    Ok(topic.split('/').collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(filter: &str) -> Vec<&str> {
        tokenize_filter(filter).unwrap().levels.to_vec()
    }

    #[test]
    fn test_tokenize_plain_filters() {
        assert_eq!(levels("test"), vec!["test"]);
        assert_eq!(levels("test/topic"), vec!["test", "topic"]);
        assert_eq!(levels("+/+/+"), vec!["+", "+", "+"]);
        assert_eq!(levels("test/#"), vec!["test", "#"]);
        assert_eq!(levels("#"), vec!["#"]);
    }

    #[test]
    fn test_empty_levels_are_preserved() {
        assert_eq!(levels("a//b"), vec!["a", "", "b"]);
        assert_eq!(levels("/a"), vec!["", "a"]);
        assert_eq!(levels("a/"), vec!["a", ""]);
    }

    #[test]
    fn test_invalid_filters() {
        assert_eq!(tokenize_filter(""), Err(TopicError::Empty));
        assert_eq!(
            tokenize_filter("test+"),
            Err(TopicError::WildcardMixedWithText)
        );
        assert_eq!(
            tokenize_filter("te#st"),
            Err(TopicError::WildcardMixedWithText)
        );
        assert_eq!(
            tokenize_filter("a/#/b"),
            Err(TopicError::MultiLevelNotLast)
        );
        assert_eq!(tokenize_filter("a\0b"), Err(TopicError::NulCharacter));

        let long = "a".repeat(TOPIC_MAX_LEN + 1);
        assert_eq!(tokenize_filter(&long), Err(TopicError::TooLong));
    }

    #[test]
    fn test_shared_subscription_prefix() {
        let t = tokenize_filter("$share/group1/a/b").unwrap();
        assert_eq!(t.share_group, Some("group1"));
        assert_eq!(t.levels.to_vec(), vec!["a", "b"]);

        // $share filters may still use wildcards in the effective filter
        let t = tokenize_filter("$share/g/+/b/#").unwrap();
        assert_eq!(t.share_group, Some("g"));
        assert_eq!(t.levels.to_vec(), vec!["+", "b", "#"]);
    }

    #[test]
    fn test_invalid_shared_subscriptions() {
        assert_eq!(
            tokenize_filter("$share/g"),
            Err(TopicError::SharedGroupInvalid)
        );
        assert_eq!(
            tokenize_filter("$share//x"),
            Err(TopicError::SharedGroupInvalid)
        );
        assert_eq!(
            tokenize_filter("$share/g+h/x"),
            Err(TopicError::SharedGroupInvalid)
        );
        assert_eq!(
            tokenize_filter("$share/g/"),
            Err(TopicError::SharedFilterEmpty)
        );
    }

    #[test]
    fn test_tokenize_topic_names() {
        assert_eq!(tokenize_topic("a/b/c").unwrap().to_vec(), vec!["a", "b", "c"]);
        assert_eq!(
            tokenize_topic("$SYS/broker/uptime").unwrap().to_vec(),
            vec!["$SYS", "broker", "uptime"]
        );
        assert_eq!(tokenize_topic("a//b").unwrap().to_vec(), vec!["a", "", "b"]);

        assert_eq!(tokenize_topic(""), Err(TopicError::Empty));
        assert_eq!(tokenize_topic("a/+/b"), Err(TopicError::WildcardInTopicName));
        assert_eq!(tokenize_topic("a/#"), Err(TopicError::WildcardInTopicName));
        assert_eq!(
            tokenize_topic("$share/g/x"),
            Err(TopicError::SharedPrefixInTopicName)
        );
    }
}
