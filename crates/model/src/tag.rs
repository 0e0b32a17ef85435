//! Tag normalization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A set of normalized tags.
///
/// Backed by a [`BTreeSet`] so that equal sets always serialize (and digest)
/// identically, whatever order the source listed them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeSet<String>);
impl Tags {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Union of several tag sets (an album's tags are those of its photos).
    pub fn union<'a>(sets: impl IntoIterator<Item = &'a Tags>) -> Self {
        Self(sets.into_iter().flat_map(|t| t.0.iter().cloned()).collect())
    }
}
impl<'a> IntoIterator for &'a Tags {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Normalizes raw tags and drops the ones on the deny-list.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    deny: BTreeSet<String>,
}
impl TagFilter {
    /// Deny-list entries go through the same normalization as tags, so
    /// `"Status Update"` in configuration blocks `status-update`.
    pub fn new<I, S>(deny: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            deny: deny.into_iter().filter_map(|t| Self::normalize(t.as_ref())).collect(),
        }
    }

    /// Lowercase, strip a leading `#`, and collapse runs of whitespace,
    /// hyphens and underscores into a single hyphen. Returns `None` for tags
    /// that are empty after normalization.
    pub fn normalize(raw: &str) -> Option<String> {
        let trimmed = raw.trim().trim_start_matches('#');
        let mut normalized = String::with_capacity(trimmed.len());
        let mut pending_separator = false;
        for c in trimmed.chars() {
            if c.is_whitespace() || c == '-' || c == '_' {
                pending_separator = !normalized.is_empty();
                continue;
            }
            if pending_separator {
                normalized.push('-');
                pending_separator = false;
            }
            normalized.extend(c.to_lowercase());
        }
        (!normalized.is_empty()).then_some(normalized)
    }

    pub fn is_denied(&self, tag: &str) -> bool {
        self.deny.contains(tag)
    }

    pub fn apply<I, S>(&self, raw: I) -> Tags
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Tags(raw.into_iter().filter_map(|t| Self::normalize(t.as_ref())).filter(|t| !self.is_denied(t)).collect())
    }
}
