//! Date-ordered entity sets.

use crate::entity::Record;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A keyed collection of entities plus their date-descending order.
///
/// `order` is always rebuilt from scratch from the entities' dates with a
/// stable sort, so ties keep the order in which the source listed them. It
/// is never patched in place. Entities are kept in a [`BTreeMap`] so equal
/// sets serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderedEntitySet<T> {
    entities: BTreeMap<String, T>,
    order: Vec<String>,
}
impl<T> Default for OrderedEntitySet<T> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
            order: Vec::new(),
        }
    }
}
impl<T: Record> OrderedEntitySet<T> {
    /// Build a set from entities in source order.
    ///
    /// If a key turns up twice, the later entity wins but the key keeps the
    /// position of its first appearance for tie-breaking.
    pub fn from_entities(entities: impl IntoIterator<Item = T>) -> Self {
        let mut map = BTreeMap::new();
        let mut order = Vec::new();
        for entity in entities {
            let key = entity.set_key().into_owned();
            if map.insert(key.clone(), entity).is_none() {
                order.push(key);
            }
        }
        // `sort_by` is stable: equal dates keep their insertion order.
        order.sort_by(|a, b| {
            let date = |key: &String| map.get(key).map(Record::date);
            date(b).cmp(&date(a))
        });
        Self { entities: map, order }
    }

    /// Entities from `previous` whose keys are missing here are carried over.
    /// Nothing is ever dropped just because a source stopped listing it.
    pub fn carry_forward(self, previous: &Self) -> Self
    where
        T: Clone,
    {
        if previous.order.iter().all(|key| self.entities.contains_key(key)) {
            return self;
        }
        let missing: Vec<T> =
            previous.iter().filter(|entity| !self.entities.contains_key(entity.set_key().as_ref())).cloned().collect();
        Self::from_entities(self.into_entities().into_iter().chain(missing))
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entities.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entities.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys, newest first.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    /// Entities, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|key| self.entities.get(key))
    }

    /// Entities, newest first.
    pub fn into_entities(self) -> Vec<T> {
        let Self { mut entities, order } = self;
        order.into_iter().filter_map(|key| entities.remove(&key)).collect()
    }
}

/// The on-disk shape, before the invariants have been re-established.
#[derive(Deserialize)]
struct Unchecked<T> {
    #[serde(default = "BTreeMap::new")]
    entities: BTreeMap<String, T>,
    #[serde(default)]
    order: Vec<String>,
}

/// A persisted set is only trusted as far as its entities go: the order is
/// recomputed, using the stored order purely as the tie-breaker.
impl<'de, T: Record + Deserialize<'de>> Deserialize<'de> for OrderedEntitySet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Unchecked { mut entities, order } = Unchecked::<T>::deserialize(deserializer)?;
        let mut listed: Vec<T> = order.iter().filter_map(|key| entities.remove(key)).collect();
        listed.extend(entities.into_values());
        Ok(Self::from_entities(listed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::micro;
    use crate::entity::{Entity, MicroPost};
    use time::macros::datetime;

    fn assert_invariants<T: Record>(set: &OrderedEntitySet<T>) {
        let mut keys: Vec<_> = set.keys().to_vec();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), set.len(), "order must not repeat keys");
        assert!(set.keys().iter().all(|k| set.contains(k)), "order must only hold known keys");
        assert_eq!(set.entities.len(), set.len(), "every entity must be ordered");
        let dates: Vec<_> = set.iter().map(Record::date).collect();
        assert!(dates.windows(2).all(|w| w[0] >= w[1]), "order must be date-descending");
    }

    #[test]
    fn test_orders_by_date_descending() {
        let set = OrderedEntitySet::from_entities([
            micro("b", datetime!(2024-01-15 00:00 UTC)),
            micro("a", datetime!(2023-12-20 00:00 UTC)),
            micro("c", datetime!(2024-03-01 00:00 UTC)),
        ]);
        assert_eq!(set.keys(), ["c", "b", "a"]);
        assert_invariants(&set);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let date = datetime!(2024-01-15 00:00 UTC);
        let set = OrderedEntitySet::from_entities([micro("z", date), micro("a", date), micro("m", date)]);
        assert_eq!(set.keys(), ["z", "a", "m"]);
    }

    #[test]
    fn test_duplicate_keys_keep_first_position_and_last_value() {
        let date = datetime!(2024-01-15 00:00 UTC);
        let mut replacement = micro("a", date);
        replacement.body = "replacement".to_string();
        let set = OrderedEntitySet::from_entities([micro("a", date), micro("b", date), replacement]);
        assert_eq!(set.keys(), ["a", "b"]);
        assert_eq!(set.get("a").unwrap().body, "replacement");
        assert_invariants(&set);
    }

    #[test]
    fn test_carry_forward_keeps_vanished_entities() {
        let previous = OrderedEntitySet::from_entities([
            micro("old", datetime!(2020-01-01 00:00 UTC)),
            micro("kept", datetime!(2024-01-01 00:00 UTC)),
        ]);
        let current = OrderedEntitySet::from_entities([micro("kept", datetime!(2024-01-01 00:00 UTC))]);
        let merged = current.carry_forward(&previous);
        assert_eq!(merged.keys(), ["kept", "old"]);
        assert_invariants(&merged);
    }

    #[test]
    fn test_mixed_entities_use_namespaced_keys() {
        let date = datetime!(2024-01-15 00:00 UTC);
        let set = OrderedEntitySet::from_entities([Entity::from(micro("a", date))]);
        assert_eq!(set.keys(), ["micro-post:a"]);
    }

    #[test]
    fn test_deserialize_recomputes_order() {
        let set = OrderedEntitySet::from_entities([
            micro("a", datetime!(2023-12-20 00:00 UTC)),
            micro("b", datetime!(2024-01-15 00:00 UTC)),
        ]);
        let mut json = serde_json::to_value(&set).unwrap();
        // Tamper with the persisted order: wrong direction and a stray key.
        json["order"] = serde_json::json!(["a", "b", "ghost", "a"]);
        let back: OrderedEntitySet<MicroPost> = serde_json::from_value(json).unwrap();
        assert_eq!(back.keys(), ["b", "a"]);
        assert_invariants(&back);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let date = datetime!(2024-01-15 00:00 UTC);
        let forwards = OrderedEntitySet::from_entities([micro("a", date), micro("b", datetime!(2024-02-01 00:00 UTC))]);
        let backwards =
            OrderedEntitySet::from_entities([micro("b", datetime!(2024-02-01 00:00 UTC)), micro("a", date)]);
        assert_eq!(serde_json::to_string(&forwards).unwrap(), serde_json::to_string(&backwards).unwrap());
    }

    #[test]
    fn test_into_entities_follows_order() {
        let set = OrderedEntitySet::from_entities([
            micro("a", datetime!(2023-12-20 00:00 UTC)),
            micro("b", datetime!(2024-01-15 00:00 UTC)),
        ]);
        let keys: Vec<_> = set.into_entities().into_iter().map(|p| p.meta.key).collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
