use std::{collections::BTreeMap, sync::RwLock};

use bytes::Bytes;

use super::{ListableStore, ReadableStore, Store, StoreError, WriteableStore};

/// An in-memory store backed by an ordered map.
///
/// Listing order is lexicographic, so store contents are deterministic
/// across runs. Values are [`Bytes`], so `get` is a cheap handle clone.
/// This store is thread-safe.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently present.
    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Bytes>> {
        self.map.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Bytes>> {
        self.map.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {}

impl ReadableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.read_map().get(key).cloned())
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read_map().contains_key(key))
    }
}

impl ListableStore for MemoryStore {
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let map = self.read_map();
        Ok(map
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

impl WriteableStore for MemoryStore {
    fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.write_map().insert(key.to_owned(), value);
        Ok(())
    }

    fn erase(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.write_map().remove(key).is_some())
    }

    fn erase_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.write_map().retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}
