//! Storage Backend Module
//!
//! The identifier-to-entry store the cache engine sits on top of.
//! Backends hold entries only; expiration and querying live in the engine.

mod memory;

pub use memory::MemoryBackend;

use crate::cache::Entry;

// == Storage Backend Trait ==
/// Minimal key-value store used by [`crate::Cache`].
///
/// All four operations must be safe to call concurrently; the engine's
/// background sweep runs alongside caller operations.
pub trait StorageBackend<K, V>: Send + Sync {
    /// A name for log context, e.g. `"memory"`.
    fn name(&self) -> &'static str;

    /// Associates `id` with `entry`, replacing any previous association.
    fn set_value(&self, id: &str, entry: Entry<K, V>);

    /// Returns the entry stored under `id`.
    fn get_value(&self, id: &str) -> Option<Entry<K, V>>;

    /// Returns every identifier currently stored.
    fn all_keys(&self) -> Vec<String>;

    /// Deletes the association for `id`. No-op if absent.
    fn remove(&self, id: &str);
}
