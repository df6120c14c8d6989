//! Insertion-ordered entry index.
//!
//! Entries are stored oldest first; consumers see them newest first. The
//! "logical top" of the list is therefore the end of `order`.

use std::collections::HashMap;

use crate::entry::EntryModel;

#[derive(Debug, Clone, Default)]
pub struct OrderedEntries {
    order: Vec<String>,
    by_key: HashMap<String, EntryModel>,
}

impl OrderedEntries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&EntryModel> {
        self.by_key.get(key)
    }

    /// Replace an entry in place, or append it as the newest.
    pub fn insert(&mut self, entry: EntryModel) -> Option<EntryModel> {
        let key = entry.key().to_string();
        let previous = self.by_key.insert(key.clone(), entry);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    pub fn remove(&mut self, key: &str) -> Option<EntryModel> {
        let removed = self.by_key.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &EntryModel> {
        self.order.iter().filter_map(|k| self.by_key.get(k))
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &EntryModel> {
        self.order.iter().rev().filter_map(|k| self.by_key.get(k))
    }

    /// Everything but deleted entries, newest first.
    pub fn visible(&self) -> Vec<EntryModel> {
        self.iter_newest_first()
            .filter(|e| !e.is_deleted())
            .cloned()
            .collect()
    }

    /// Deepest entry of the run of deleted entries at the top, if any.
    pub fn vacant_key(&self) -> Option<&str> {
        self.iter_newest_first()
            .take_while(|e| e.is_deleted())
            .last()
            .map(EntryModel::key)
    }
}
