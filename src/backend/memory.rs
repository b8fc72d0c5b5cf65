use std::collections::HashMap;

use parking_lot::RwLock;

use crate::backend::StorageBackend;
use crate::cache::Entry;

/// Thread-safe in-memory backend using a HashMap behind a RwLock.
///
/// No persistence and no eviction of its own. This is the backend a
/// [`crate::Cache`] uses unless another one is supplied.
pub struct MemoryBackend<K, V> {
    entries: RwLock<HashMap<String, Entry<K, V>>>,
}

impl<K, V> MemoryBackend<K, V> {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> Default for MemoryBackend<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> StorageBackend<K, V> for MemoryBackend<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        "memory"
    }

    fn set_value(&self, id: &str, entry: Entry<K, V>) {
        self.entries.write().insert(id.to_string(), entry);
    }

    fn get_value(&self, id: &str) -> Option<Entry<K, V>> {
        self.entries.read().get(id).cloned()
    }

    fn all_keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn remove(&self, id: &str) {
        self.entries.write().remove(id);
    }
}
