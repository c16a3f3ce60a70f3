//! Multi-keyed entity storage for the in-memory configuration backend.
//!
//! A [`Collection`] owns its entities in an arena keyed by a sequence
//! number. Secondary indexes map each natural key, and the modification
//! time, to sequence numbers only. Sequence numbers grow monotonically and
//! a replaced entity keeps its number, so iterating a key group yields
//! entities in the order they were first inserted.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use chrono::{DateTime, Utc};

/// An entity stored in a [`Collection`].
pub trait Indexed {
    /// Primary natural key. Several entities may share it (one per scope).
    type Key: Ord + Clone;
    /// Secondary natural key; `()` for kinds that have none.
    type AltKey: Ord + Clone;

    fn key(&self) -> Self::Key;

    fn alt_key(&self) -> Option<Self::AltKey> {
        None
    }

    fn modification_time(&self) -> DateTime<Utc>;
}

/// Position of an entity in a collection.
pub type EntryId = u64;

#[derive(Debug, Clone)]
pub struct Collection<T: Indexed> {
    next_id: EntryId,
    entries: BTreeMap<EntryId, T>,
    by_key: BTreeMap<T::Key, BTreeSet<EntryId>>,
    by_alt_key: BTreeMap<T::AltKey, BTreeSet<EntryId>>,
    by_time: BTreeSet<(DateTime<Utc>, EntryId)>,
}

impl<T: Indexed> Default for Collection<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
            by_key: BTreeMap::new(),
            by_alt_key: BTreeMap::new(),
            by_time: BTreeSet::new(),
        }
    }
}

impl<T: Indexed> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&T> {
        self.entries.get(&id)
    }

    /// Iterates over every entity in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &T)> {
        self.entries.iter().map(|(id, entity)| (*id, entity))
    }

    /// Entities whose primary key equals `key`, in insertion order.
    pub fn find<'a>(
        &'a self,
        key: &T::Key,
    ) -> impl Iterator<Item = (EntryId, &'a T)> + use<'a, T> {
        self.lookup(self.by_key.get(key))
    }

    /// Entities whose secondary key equals `key`, in insertion order.
    pub fn find_alt<'a>(
        &'a self,
        key: &T::AltKey,
    ) -> impl Iterator<Item = (EntryId, &'a T)> + use<'a, T> {
        self.lookup(self.by_alt_key.get(key))
    }

    /// Entities modified at or after `since`, oldest first.
    pub fn modified_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = (EntryId, &T)> {
        self.by_time
            .range((Bound::Included((since, EntryId::MIN)), Bound::Unbounded))
            .filter_map(|(_, id)| self.entries.get(id).map(|entity| (*id, entity)))
    }

    fn lookup<'a>(
        &'a self,
        ids: Option<&'a BTreeSet<EntryId>>,
    ) -> impl Iterator<Item = (EntryId, &'a T)> + 'a {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id).map(|entity| (*id, entity)))
    }

    /// Adds an entity and returns its id.
    pub fn insert(&mut self, entity: T) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        self.index(id, &entity);
        self.entries.insert(id, entity);
        id
    }

    /// Swaps the entity at `id` for `entity`, returning the old one.
    pub fn replace(&mut self, id: EntryId, entity: T) -> Option<T> {
        let old = self.remove(id)?;
        self.index(id, &entity);
        self.entries.insert(id, entity);
        Some(old)
    }

    /// Modifies the entity at `id` in place, keeping the indexes current.
    pub fn update<R>(&mut self, id: EntryId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut entity = self.remove(id)?;
        let result = f(&mut entity);
        self.index(id, &entity);
        self.entries.insert(id, entity);
        Some(result)
    }

    pub fn remove(&mut self, id: EntryId) -> Option<T> {
        let entity = self.entries.remove(&id)?;
        remove_from(&mut self.by_key, &entity.key(), id);
        if let Some(alt) = entity.alt_key() {
            remove_from(&mut self.by_alt_key, &alt, id);
        }
        self.by_time.remove(&(entity.modification_time(), id));
        Some(entity)
    }

    /// Removes every entity matching `predicate`, returning how many.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> u64 {
        let ids: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(_, entity)| predicate(entity))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.remove(*id);
        }
        ids.len() as u64
    }

    /// Removes everything, returning how many entities there were.
    pub fn clear(&mut self) -> u64 {
        let count = self.entries.len() as u64;
        self.entries.clear();
        self.by_key.clear();
        self.by_alt_key.clear();
        self.by_time.clear();
        count
    }

    fn index(&mut self, id: EntryId, entity: &T) {
        self.by_key.entry(entity.key()).or_default().insert(id);
        if let Some(alt) = entity.alt_key() {
            self.by_alt_key.entry(alt).or_default().insert(id);
        }
        self.by_time.insert((entity.modification_time(), id));
    }
}

fn remove_from<K: Ord>(index: &mut BTreeMap<K, BTreeSet<EntryId>>, key: &K, id: EntryId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        code: u16,
        name: String,
        mtime: DateTime<Utc>,
    }

    impl Indexed for Entry {
        type Key = u16;
        type AltKey = String;

        fn key(&self) -> u16 {
            self.code
        }

        fn alt_key(&self) -> Option<String> {
            Some(self.name.clone())
        }

        fn modification_time(&self) -> DateTime<Utc> {
            self.mtime
        }
    }

    fn entry(code: u16, name: &str, offset: i64) -> Entry {
        Entry {
            code,
            name: name.to_string(),
            mtime: DateTime::from_timestamp(1_700_000_000 + offset, 0).unwrap(),
        }
    }

    #[test]
    fn test_lookup_by_both_keys() {
        let mut collection = Collection::new();
        let a = collection.insert(entry(1, "one", 0));
        let b = collection.insert(entry(1, "uno", 5));
        collection.insert(entry(2, "two", 1));

        let ids: Vec<_> = collection.find(&1).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(collection.find_alt(&"uno".to_string()).count(), 1);
        assert_eq!(collection.find(&9).count(), 0);
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_replace_keeps_position_and_reindexes() {
        let mut collection = Collection::new();
        let a = collection.insert(entry(1, "one", 0));
        collection.insert(entry(1, "uno", 1));

        collection.replace(a, entry(1, "eins", 10)).unwrap();
        let names: Vec<_> = collection.find(&1).map(|(_, e)| e.name.clone()).collect();
        assert_eq!(names, vec!["eins", "uno"]);
        assert_eq!(collection.find_alt(&"one".to_string()).count(), 0);
    }

    #[test]
    fn test_modified_since() {
        let mut collection = Collection::new();
        collection.insert(entry(1, "a", 30));
        collection.insert(entry(2, "b", 10));
        collection.insert(entry(3, "c", 20));

        let since = DateTime::from_timestamp(1_700_000_000, 0).unwrap() + TimeDelta::seconds(20);
        let codes: Vec<_> = collection.modified_since(since).map(|(_, e)| e.code).collect();
        assert_eq!(codes, vec![3, 1]);
    }

    #[test]
    fn test_update_and_remove_where() {
        let mut collection = Collection::new();
        let a = collection.insert(entry(1, "a", 0));
        collection.insert(entry(2, "b", 0));

        collection.update(a, |e| e.name = "z".to_string()).unwrap();
        assert_eq!(collection.find_alt(&"z".to_string()).count(), 1);

        assert_eq!(collection.remove_where(|e| e.code == 2), 1);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.clear(), 1);
        assert!(collection.is_empty());
    }
}
