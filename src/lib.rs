//! Tag Cache - An in-process key/value cache
//!
//! Memoizes values under arbitrary serializable keys, expires them by TTL
//! (optionally sliding on access), and invalidates groups of entries by tag.

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod normalize;
mod tasks;

pub use backend::{MemoryBackend, StorageBackend};
pub use cache::{Cache, CacheBuilder, CacheStats, Entry, EntryFilter, Finder, GetOptions, SetOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, GetOrSetMode};
pub use error::{CacheError, Result};
pub use normalize::{JsonKeyNormalizer, KeyNormalizer};
