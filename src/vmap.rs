//! # Vector Maps
//!
//! Typed heterogeneous parameter bags with batch semantics, used by the
//! syscall surface to pass schemas, value lists and result sets across
//! the host boundary. A vector map holds a sequence of *batches*; each
//! batch maps string keys to homogeneous vectors of one of four kinds
//! (strings, column types, values, indexes).
//!
//! Maps live in the per-process `mod_tabledb/vector_maps` store under a
//! numeric id allocated by [`VectorMapUtil`]; the host passes ids, not
//! maps, through the syscall ABI.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::facility::{DataStore, VECTOR_MAPS_STORE};
use crate::types::{ColumnType, Value};

/// One batch of keyed vectors.
#[derive(Debug, Default, Clone)]
pub struct VectorMapBatch {
    strings: HashMap<String, Vec<String>>,
    types: HashMap<String, Vec<ColumnType>>,
    values: HashMap<String, Vec<Value>>,
    indexes: HashMap<String, Vec<u64>>,
}

/// A batched parameter bag.
#[derive(Debug)]
pub struct VectorMap {
    id: u64,
    batches: Vec<VectorMapBatch>,
    current: usize,
}

impl VectorMap {
    fn new(id: u64) -> Self {
        Self {
            id,
            batches: vec![VectorMapBatch::default()],
            current: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of batches. Always at least one.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Selects the batch subsequent accessors operate on.
    pub fn set_batch(&mut self, index: usize) -> bool {
        if index < self.batches.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    /// Appends a fresh batch and selects it.
    pub fn add_batch(&mut self) {
        self.batches.push(VectorMapBatch::default());
        self.current = self.batches.len() - 1;
    }

    pub fn strings(&self, key: &str) -> Option<&[String]> {
        self.batches[self.current].strings.get(key).map(Vec::as_slice)
    }

    pub fn set_strings(&mut self, key: impl Into<String>, strings: Vec<String>) {
        self.batches[self.current].strings.insert(key.into(), strings);
    }

    pub fn types(&self, key: &str) -> Option<&[ColumnType]> {
        self.batches[self.current].types.get(key).map(Vec::as_slice)
    }

    pub fn set_types(&mut self, key: impl Into<String>, types: Vec<ColumnType>) {
        self.batches[self.current].types.insert(key.into(), types);
    }

    pub fn values(&self, key: &str) -> Option<&[Value]> {
        self.batches[self.current].values.get(key).map(Vec::as_slice)
    }

    pub fn set_values(&mut self, key: impl Into<String>, values: Vec<Value>) {
        self.batches[self.current].values.insert(key.into(), values);
    }

    pub fn indexes(&self, key: &str) -> Option<&[u64]> {
        self.batches[self.current].indexes.get(key).map(Vec::as_slice)
    }

    pub fn set_indexes(&mut self, key: impl Into<String>, indexes: Vec<u64>) {
        self.batches[self.current].indexes.insert(key.into(), indexes);
    }
}

/// A shared, lockable vector map as stored in the per-process store.
pub type SharedVectorMap = Arc<Mutex<VectorMap>>;

/// Allocates vector maps and finds them again by id.
#[derive(Debug, Default)]
pub struct VectorMapUtil {
    next_id: AtomicU64,
}

impl VectorMapUtil {
    pub fn new() -> Self {
        Self::default()
    }

    fn store_key(id: u64) -> String {
        format!("{VECTOR_MAPS_STORE}/{id}")
    }

    /// Creates a new map in the given store and returns it.
    pub fn new_map(&self, store: &dyn DataStore) -> SharedVectorMap {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let map: SharedVectorMap = Arc::new(Mutex::new(VectorMap::new(id)));
        store.set(&Self::store_key(id), Arc::clone(&map) as _);
        map
    }

    /// Looks up an existing map by id.
    pub fn get_map(&self, store: &dyn DataStore, id: u64) -> Option<SharedVectorMap> {
        store
            .get(&Self::store_key(id))?
            .downcast::<Mutex<VectorMap>>()
            .ok()
    }

    /// Removes a map by id; returns whether one existed.
    pub fn delete_map(&self, store: &dyn DataStore, id: u64) -> bool {
        store.remove(&Self::store_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::memory::MemoryDataStore;

    #[test]
    fn batches_are_independent() {
        let util = VectorMapUtil::new();
        let store = MemoryDataStore::default();
        let map = util.new_map(&store);

        {
            let mut map = map.lock();
            map.set_strings("names", vec!["a".into()]);
            map.add_batch();
            map.set_strings("names", vec!["b".into()]);

            assert_eq!(map.batch_count(), 2);
            assert!(map.set_batch(0));
            assert_eq!(map.strings("names"), Some(&["a".to_string()][..]));
            assert!(map.set_batch(1));
            assert_eq!(map.strings("names"), Some(&["b".to_string()][..]));
            assert!(!map.set_batch(2));
        }
    }

    #[test]
    fn ids_resolve_through_the_store() {
        let util = VectorMapUtil::new();
        let store = MemoryDataStore::default();

        let map = util.new_map(&store);
        let id = map.lock().id();

        let found = util.get_map(&store, id).expect("map is registered");
        assert!(Arc::ptr_eq(&map, &found));

        assert!(util.delete_map(&store, id));
        assert!(util.get_map(&store, id).is_none());
        assert!(!util.delete_map(&store, id));
    }

    #[test]
    fn distinct_maps_get_distinct_ids() {
        let util = VectorMapUtil::new();
        let store = MemoryDataStore::default();
        let a = util.new_map(&store).lock().id();
        let b = util.new_map(&store).lock().id();
        assert_ne!(a, b);
    }
}
