//! The concurrent keyed store (component E) underneath a [`super::Registry`].
//!
//! Built directly on [`dashmap::DashMap`]: its sharded-lock design already
//! gives per-key linearizability and weakly-consistent iteration, which is
//! exactly what this component's contract asks for, without a hand-rolled
//! sharding scheme on top.

use std::hash::Hash;

use dashmap::DashMap;

/// A concurrent keyed map of entries. Every operation is linearizable with
/// respect to other operations on the same key.
pub struct RegistryStore<K, V> {
    map: DashMap<K, V>,
}

impl<K, V> Default for RegistryStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        RegistryStore { map: DashMap::new() }
    }
}

impl<K, V> RegistryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing entry for `key`, or call `factory(&key)` exactly
    /// once and store its result. Concurrent callers racing on the same
    /// absent key never invoke `factory` more than once; all of them
    /// observe the same returned entry.
    pub fn compute_if_absent(&self, key: K, factory: impl FnOnce(&K) -> V) -> V {
        self.compute_if_absent_detailed(key, factory).0
    }

    /// Same contract as [`Self::compute_if_absent`], additionally reporting
    /// whether `factory` was invoked (`true`) or an existing entry was
    /// returned (`false`).
    pub fn compute_if_absent_detailed(&self, key: K, factory: impl FnOnce(&K) -> V) -> (V, bool) {
        match self.map.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => (occupied.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let value = factory(vacant.key());
                vacant.insert(value.clone());
                (value, true)
            }
        }
    }

    /// Insert `value` for `key` only if `key` is absent. Returns the
    /// pre-existing entry on conflict, `None` on success.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        match self.map.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => Some(occupied.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(value);
                None
            }
        }
    }

    /// Look up `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|r| r.clone())
    }

    /// Remove and return the entry for `key`, if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, v)| v)
    }

    /// Replace the entry for `key` with `new`, returning the old value.
    /// A no-op returning `None` if `key` is absent.
    pub fn replace(&self, key: &K, new: V) -> Option<V> {
        match self.map.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                Some(occupied.insert(new))
            }
            dashmap::mapref::entry::Entry::Vacant(_) => None,
        }
    }

    /// A weakly-consistent snapshot of every value currently in the store.
    /// Never panics under concurrent mutation.
    pub fn values(&self) -> Vec<V> {
        self.map.iter().map(|r| r.value().clone()).collect()
    }

    /// Number of entries currently in the store.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the store currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
