//! Cross-type structures derived from a snapshot.
//!
//! All three are pure functions of the snapshot and are rebuilt from scratch
//! on every run. Nothing here mutates an entity.

use almanac_model::{Entity, OrderedEntitySet, Record, Snapshot};
use serde::Serialize;
use std::collections::BTreeMap;

/// Tag to namespaced entity keys, each list in timeline order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagIndex(BTreeMap<String, Vec<String>>);
impl TagIndex {
    /// Every tagged entity on the timeline is indexed, album photos and
    /// albums included, exactly like the year index. An album's tags are the
    /// union of its photos' tags, so a tag listing can show both.
    pub fn build(timeline: &OrderedEntitySet<Entity>) -> Self {
        let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entity in timeline.iter() {
            for tag in entity.tags() {
                tags.entry(tag.clone()).or_default().push(entity.set_key().into_owned());
            }
        }
        Self(tags)
    }

    pub fn get(&self, tag: &str) -> Option<&[String]> {
        self.0.get(tag).map(Vec::as_slice)
    }

    /// Number of entities carrying `tag`.
    pub fn count(&self, tag: &str) -> usize {
        self.0.get(tag).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(tag, keys)| (tag.as_str(), keys.as_slice()))
    }
}

/// A year's worth of namespaced entity keys, in timeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Year {
    pub year: i32,
    pub keys: Vec<String>,
}

/// The timeline partitioned by year, newest year first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct YearIndex(Vec<Year>);
impl YearIndex {
    pub fn build(timeline: &OrderedEntitySet<Entity>) -> Self {
        let mut years: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for entity in timeline.iter() {
            years.entry(entity.date().year()).or_default().push(entity.set_key().into_owned());
        }
        Self(years.into_iter().rev().map(|(year, keys)| Year { year, keys }).collect())
    }

    pub fn get(&self, year: i32) -> Option<&[String]> {
        self.0.iter().find(|entry| entry.year == year).map(|entry| entry.keys.as_slice())
    }

    /// Years present, newest first.
    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().map(|entry| entry.year)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything derived from a snapshot.
#[derive(Debug, Clone, Default)]
pub struct Indexes {
    /// Every entity of every type, newest first, keyed `{kind}:{key}`.
    pub timeline: OrderedEntitySet<Entity>,
    pub tags: TagIndex,
    pub years: YearIndex,
}
impl Indexes {
    pub fn build(snapshot: &Snapshot) -> Self {
        let timeline = OrderedEntitySet::from_entities(snapshot.entities());
        let tags = TagIndex::build(&timeline);
        let years = YearIndex::build(&timeline);
        Self { timeline, tags, years }
    }
}
