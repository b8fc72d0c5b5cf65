//! Cache Module
//!
//! The cache engine with TTL expiration, sliding refresh and tag queries.

mod builder;
mod engine;
mod entry;
mod options;
mod stats;


// Re-export public types
pub use builder::CacheBuilder;
pub use engine::{Cache, Callback};
pub use entry::Entry;
pub use options::{EntryFilter, Finder, GetOptions, SetOptions};
pub use stats::CacheStats;
