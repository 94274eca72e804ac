//! Topic name/filter validation and the wildcard matching trie.
//!
//! Filters sharing a prefix share trie nodes, so a large subscription
//! set stays compact and matching walks at most one path per level plus
//! the `+` branches.

use crate::error::{MqttError, Result};
use std::collections::HashMap;

/// A topic name as published: no wildcards, non-empty, within the
/// string length limit.
pub fn validate_topic_name(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(MqttError::InvalidTopicName(
            "topic name must not be empty".to_string(),
        ));
    }
    if topic.len() > crate::encoding::MAX_STRING_LEN {
        return Err(MqttError::InvalidTopicName(format!(
            "topic name exceeds {} bytes",
            crate::encoding::MAX_STRING_LEN
        )));
    }
    if topic.contains('\u{0}') {
        return Err(MqttError::InvalidTopicName(
            "topic name must not contain U+0000".to_string(),
        ));
    }
    if topic.contains(['+', '#']) {
        return Err(MqttError::InvalidTopicName(format!(
            "topic name must not contain wildcards: {topic}"
        )));
    }
    Ok(())
}

/// A subscription filter: `+` must occupy a whole level, `#` must be
/// the final level.
pub fn validate_topic_filter(filter: &str) -> Result<()> {
    if filter.is_empty() {
        return Err(MqttError::InvalidTopicFilter(
            "topic filter must not be empty".to_string(),
        ));
    }
    if filter.len() > crate::encoding::MAX_STRING_LEN {
        return Err(MqttError::InvalidTopicFilter(format!(
            "topic filter exceeds {} bytes",
            crate::encoding::MAX_STRING_LEN
        )));
    }
    if filter.contains('\u{0}') {
        return Err(MqttError::InvalidTopicFilter(
            "topic filter must not contain U+0000".to_string(),
        ));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" {
                return Err(MqttError::InvalidTopicFilter(format!(
                    "'#' must occupy an entire level: {filter}"
                )));
            }
            if i != levels.len() - 1 {
                return Err(MqttError::InvalidTopicFilter(format!(
                    "'#' must be the last level: {filter}"
                )));
            }
        }
        if level.contains('+') && *level != "+" {
            return Err(MqttError::InvalidTopicFilter(format!(
                "'+' must occupy an entire level: {filter}"
            )));
        }
    }
    Ok(())
}

/// Direct filter match without a trie. `$`-prefixed topics never match
/// a filter whose first level is a wildcard.
#[must_use]
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // "#" swallows the rest, including the parent level itself,
            // so "sport/#" matches "sport".
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(level), Some(topic_level)) if level == topic_level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[derive(Debug)]
struct TrieNode<T> {
    children: HashMap<String, TrieNode<T>>,
    plus_child: Option<Box<TrieNode<T>>>,
    /// Values for filters ending in `#` at this node.
    hash_values: Vec<T>,
    /// Values for filters terminating exactly here.
    values: Vec<T>,
}

impl<T> Default for TrieNode<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            plus_child: None,
            hash_values: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> TrieNode<T> {
    fn is_empty(&self) -> bool {
        self.children.is_empty()
            && self.plus_child.is_none()
            && self.hash_values.is_empty()
            && self.values.is_empty()
    }
}

/// Maps topic filters to subscriber values with `+`/`#` wildcard
/// semantics. Removal prunes branches left empty.
#[derive(Debug)]
pub struct TopicTrie<T> {
    root: TrieNode<T>,
    len: usize,
}

impl<T> Default for TopicTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TopicTrie<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: TrieNode::default(),
            len: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, filter: &str, value: T) -> Result<()> {
        validate_topic_filter(filter)?;

        let mut node = &mut self.root;
        for level in filter.split('/') {
            match level {
                "#" => {
                    node.hash_values.push(value);
                    self.len += 1;
                    return Ok(());
                }
                "+" => {
                    node = node.plus_child.get_or_insert_with(Box::default);
                }
                _ => {
                    node = node.children.entry(level.to_string()).or_default();
                }
            }
        }
        node.values.push(value);
        self.len += 1;
        Ok(())
    }

    /// Removes every value under `filter` matching `predicate`. Returns
    /// the number removed. Branches emptied by the removal are pruned.
    pub fn remove<F>(&mut self, filter: &str, predicate: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        let levels: Vec<&str> = filter.split('/').collect();
        let removed = Self::remove_in(&mut self.root, &levels, &predicate);
        self.len -= removed;
        removed
    }

    fn remove_in<F>(node: &mut TrieNode<T>, levels: &[&str], predicate: &F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        let Some((level, rest)) = levels.split_first() else {
            let before = node.values.len();
            node.values.retain(|value| !predicate(value));
            return before - node.values.len();
        };

        match *level {
            "#" => {
                let before = node.hash_values.len();
                node.hash_values.retain(|value| !predicate(value));
                before - node.hash_values.len()
            }
            "+" => {
                let Some(child) = node.plus_child.as_mut() else {
                    return 0;
                };
                let removed = Self::remove_in(child, rest, predicate);
                if child.is_empty() {
                    node.plus_child = None;
                }
                removed
            }
            _ => {
                let Some(child) = node.children.get_mut(*level) else {
                    return 0;
                };
                let removed = Self::remove_in(child, rest, predicate);
                if child.is_empty() {
                    node.children.remove(*level);
                }
                removed
            }
        }
    }

    /// All values whose filter matches `topic`. A value appears once
    /// per matching filter, in no particular order.
    #[must_use]
    pub fn matches(&self, topic: &str) -> Vec<&T> {
        let levels: Vec<&str> = topic.split('/').collect();
        let mut out = Vec::new();
        let skip_wildcard_root = topic.starts_with('$');
        Self::collect(&self.root, &levels, skip_wildcard_root, &mut out);
        out
    }

    fn collect<'a>(
        node: &'a TrieNode<T>,
        levels: &[&str],
        skip_wildcards: bool,
        out: &mut Vec<&'a T>,
    ) {
        if !skip_wildcards {
            out.extend(node.hash_values.iter());
        }

        let Some((level, rest)) = levels.split_first() else {
            out.extend(node.values.iter());
            return;
        };

        if !skip_wildcards {
            if let Some(plus) = &node.plus_child {
                Self::collect(plus, rest, false, out);
                // "a/+" style filters end at the plus node; "a/+/#"
                // handled by the hash_values check on recursion.
            }
        }

        if let Some(child) = node.children.get(*level) {
            Self::collect(child, rest, false, out);
        }
    }
}
