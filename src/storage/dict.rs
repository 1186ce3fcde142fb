// Concurrent keyspace dictionary
//
// Thin layer over DashMap. The put-family operations return 1 when the
// keyspace changed in the intended direction and 0 otherwise, so callers
// can report Redis-style change counts without a second lookup.

use dashmap::DashMap;
use rand::seq::SliceRandom;

use super::entity::DataEntity;

pub struct Dict {
    map: DashMap<String, DataEntity>,
}

impl Dict {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<DataEntity> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Insert or update. Returns 1 when the key is new.
    pub fn put(&self, key: String, value: DataEntity) -> usize {
        match self.map.insert(key, value) {
            Some(_) => 0,
            None => 1,
        }
    }

    /// Insert only when absent. Returns 1 on insert.
    pub fn put_if_absent(&self, key: String, value: DataEntity) -> usize {
        match self.map.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => 0,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(value);
                1
            }
        }
    }

    /// Replace only when present. Returns 1 on replace. The shard lock
    /// held by `get_mut` makes the check-and-store atomic per key.
    pub fn put_if_exists(&self, key: &str, value: DataEntity) -> usize {
        match self.map.get_mut(key) {
            Some(mut entry) => {
                *entry.value_mut() = value;
                1
            }
            None => 0,
        }
    }

    /// Returns 1 when a key was actually removed.
    pub fn remove(&self, key: &str) -> usize {
        match self.map.remove(key) {
            Some(_) => 1,
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    /// Visit every entry; the consumer returns false to stop early.
    /// Iteration order is unspecified and safe under concurrent mutation.
    pub fn for_each<F>(&self, mut consumer: F)
    where
        F: FnMut(&str, &DataEntity) -> bool,
    {
        for entry in self.map.iter() {
            if !consumer(entry.key(), entry.value()) {
                break;
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    /// `n` keys sampled with replacement; may repeat.
    pub fn random_keys(&self, n: usize) -> Vec<String> {
        let keys = self.keys();
        if keys.is_empty() {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        (0..n)
            .filter_map(|_| keys.choose(&mut rng).cloned())
            .collect()
    }

    /// Up to `n` distinct keys, truncated when the dict is smaller.
    pub fn random_distinct_keys(&self, n: usize) -> Vec<String> {
        let keys = self.keys();
        let mut rng = rand::thread_rng();
        keys.choose_multiple(&mut rng, n.min(keys.len()))
            .cloned()
            .collect()
    }
}

impl Default for Dict {
    fn default() -> Self {
        Self::new()
    }
}
