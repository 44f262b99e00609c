// SPDX-License-Identifier: Apache-2.0
//! Reader/writer-locked key-value stores.
//!
//! Each of the engine's four stores (computation, resource, content,
//! invocation) is one [`MemoryStore`]. Stores are deduplicating and
//! monotone: entries are inserted or have their mutable cache fields
//! updated, but the identity of a hash's value never rewrites.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// A map keyed by one of the hash kinds, guarded by a reader/writer lock.
///
/// Closures passed to the accessors run while the corresponding lock is
/// held; keep them cheap. In particular, never call back into the engine
/// from inside one.
pub struct MemoryStore<K, V> {
    data: RwLock<FxHashMap<K, V>>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Copy + Eq + std::hash::Hash,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::new(FxHashMap::default()),
        }
    }

    /// Runs `reader` on the record under the shared lock, if the key exists.
    ///
    /// Returns `None` if the key is absent, `Some(reader result)` otherwise.
    pub fn get<R>(&self, key: K, reader: impl FnOnce(&V) -> R) -> Option<R> {
        self.data.read().get(&key).map(reader)
    }

    /// Inserts or overwrites the record under the exclusive lock.
    pub fn set(&self, key: K, value: V) {
        self.data.write().insert(key, value);
    }

    /// Inserts the record produced by `factory` only if the key is absent.
    pub fn set_if_new(&self, key: K, factory: impl FnOnce() -> V) {
        self.data.write().entry(key).or_insert_with(factory);
    }

    /// Runs `mutator` on the record under the exclusive lock, if the key
    /// exists.
    ///
    /// Returns `None` if the key is absent, `Some(mutator result)` otherwise.
    pub fn modify<R>(&self, key: K, mutator: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.data.write().get_mut(&key).map(mutator)
    }

    /// Runs `batch` on the whole map under one exclusive lock.
    ///
    /// This is the primitive for compound operations that must be atomic,
    /// e.g. "insert if new and build a reference to whatever record ended up
    /// stored".
    pub fn modify_many<R>(&self, batch: impl FnOnce(&mut FxHashMap<K, V>) -> R) -> R {
        batch(&mut self.data.write())
    }

    /// Runs `batch` on the whole map under one shared lock.
    pub fn read_many<R>(&self, batch: impl FnOnce(&FxHashMap<K, V>) -> R) -> R {
        batch(&self.data.read())
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Copy + Eq + std::hash::Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
