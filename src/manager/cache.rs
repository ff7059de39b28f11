//! # Weak-Value Cache
//!
//! A keyed cache that holds *weak* references to shared values. Values
//! stay alive only while external holders keep a strong reference; when
//! the last holder drops, the entry removes itself from the cache
//! deterministically.
//!
//! ## Identity guard
//!
//! Entry removal compares pointers, not keys: between the strong count
//! reaching zero and the drop hook taking the cache lock, another thread
//! may have re-created an entry under the same key. A stale drop must
//! not evict the newcomer, so the hook only removes the entry if the
//! cached weak pointer still refers to the value being dropped.
//!
//! ## Reference cycles
//!
//! The cache map is held behind an `Arc` that entries reference weakly,
//! so a cached value never keeps its own cache alive.

use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::Mutex;

type CacheMap<K, V> = Mutex<HashMap<K, Weak<CacheEntry<K, V>>>>;

/// A cached value plus the bookkeeping needed to deregister on drop.
///
/// Dereferences to the value. Obtained from
/// [`KeyValueCache::get_or_insert_with`]; all holders of the same key
/// share one entry.
#[derive(Debug)]
pub struct CacheEntry<K: Eq + Hash + Clone, V> {
    key: K,
    value: V,
    cache: Weak<CacheMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V> Deref for CacheEntry<K, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<K: Eq + Hash + Clone, V> Drop for CacheEntry<K, V> {
    fn drop(&mut self) {
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        let mut map = cache.lock();
        if let Some(weak) = map.get(&self.key) {
            if std::ptr::eq(weak.as_ptr(), self) {
                map.remove(&self.key);
            }
        }
    }
}

/// Weak-value cache keyed by `K`.
#[derive(Debug)]
pub struct KeyValueCache<K: Eq + Hash + Clone, V> {
    inner: Arc<CacheMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V> Default for KeyValueCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, V> KeyValueCache<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the live value for `key`, or constructs one with
    /// `factory` and caches it.
    ///
    /// The factory must not drop other entries of this cache (the cache
    /// lock is held while it runs).
    pub fn get_or_insert_with<F>(&self, key: K, factory: F) -> Arc<CacheEntry<K, V>>
    where
        F: FnOnce(&K) -> V,
    {
        let mut map = self.inner.lock();

        if let Some(weak) = map.get(&key) {
            if let Some(live) = weak.upgrade() {
                return live;
            }
        }

        let entry = Arc::new(CacheEntry {
            value: factory(&key),
            key: key.clone(),
            cache: Arc::downgrade(&self.inner),
        });
        map.insert(key, Arc::downgrade(&entry));
        entry
    }

    /// Whether a live entry exists for `key` (test hook).
    pub fn contains_live(&self, key: &K) -> bool {
        self.inner
            .lock()
            .get(key)
            .map_or(false, |weak| weak.strong_count() > 0)
    }

    /// Number of map slots, live or stale (test hook).
    pub fn entry_count(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_one_value() {
        let cache: KeyValueCache<String, u32> = KeyValueCache::new();
        let a = cache.get_or_insert_with("k".into(), |_| 7);
        let b = cache.get_or_insert_with("k".into(), |_| 8);
        assert_eq!(*a.deref(), 7);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn entry_is_removed_when_last_holder_drops() {
        let cache: KeyValueCache<String, u32> = KeyValueCache::new();
        let a = cache.get_or_insert_with("k".into(), |_| 1);
        let b = Arc::clone(&a);
        drop(a);
        assert!(cache.contains_live(&"k".into()));
        drop(b);
        assert!(!cache.contains_live(&"k".into()));
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn dropped_value_is_rebuilt_on_next_access() {
        let cache: KeyValueCache<String, u32> = KeyValueCache::new();
        let a = cache.get_or_insert_with("k".into(), |_| 1);
        drop(a);
        let b = cache.get_or_insert_with("k".into(), |_| 2);
        assert_eq!(*b.deref(), 2);
    }

    #[test]
    fn distinct_keys_get_distinct_values() {
        let cache: KeyValueCache<String, u32> = KeyValueCache::new();
        let a = cache.get_or_insert_with("a".into(), |_| 1);
        let b = cache.get_or_insert_with("b".into(), |_| 2);
        assert_eq!((*a.deref(), *b.deref()), (1, 2));
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn stale_drop_does_not_evict_a_replacement() {
        // Entries compare by pointer on removal: dropping an old entry
        // after its key was re-created must leave the new entry alone.
        // We simulate the interleaving by keeping the old entry alive
        // while inserting the replacement.
        let cache: KeyValueCache<String, u32> = KeyValueCache::new();
        let old = cache.get_or_insert_with("k".into(), |_| 1);

        // Force the map slot to point at a replacement entry.
        {
            let mut map = cache.inner.lock();
            map.remove("k");
        }
        let new = cache.get_or_insert_with("k".into(), |_| 2);

        drop(old);
        assert!(cache.contains_live(&"k".into()));
        assert_eq!(*new.deref(), 2);
    }
}
