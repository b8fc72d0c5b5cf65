//! Per-call options and entry finders.

use std::fmt;
use std::time::Duration;

use crate::cache::Entry;

// == Set Options ==
/// Options accepted by `Cache::set` and `Cache::get_or_set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Tags attached to the entry
    pub tags: Vec<String>,
    /// TTL overriding the configured default; zero means never expire
    pub cache_time: Option<Duration>,
    /// Slide the expiration forward on every read
    pub refresh: bool,
}

impl SetOptions {
    /// Creates options with no tags, the configured TTL and no refresh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches tags to the entry.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the configured TTL. `Duration::ZERO` means never expire.
    pub fn cache_time(mut self, ttl: Duration) -> Self {
        self.cache_time = Some(ttl);
        self
    }

    /// Slides the expiration forward on every read of the entry.
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

// == Get Options ==
/// Options accepted by `Cache::get` and `Cache::get_entry`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Overrides the entry's own refresh flag for this read only
    pub refresh: Option<bool>,
}

impl GetOptions {
    /// Creates options that defer to the entry's own refresh flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces this read to refresh (or not), whatever the entry's flag says.
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = Some(refresh);
        self
    }
}

// == Entry Filter ==
/// Structured criteria for `Cache::find`.
///
/// Every criterion that is set must hold. A filter with no criteria matches
/// nothing, so an empty filter passed to `remove_by_finder` is harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter<K> {
    /// Entry key must be one of these (compared by normalized identifier)
    pub keys: Option<Vec<K>>,
    /// Entry must carry at least one of these tags
    pub some_tag: Option<Vec<String>>,
    /// Entry must carry all of these tags
    pub every_tag: Option<Vec<String>>,
}

impl<K> Default for EntryFilter<K> {
    fn default() -> Self {
        Self {
            keys: None,
            some_tag: None,
            every_tag: None,
        }
    }
}

impl<K> EntryFilter<K> {
    /// Creates a filter with no criteria, which matches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts matches to these keys.
    pub fn keys<I: IntoIterator<Item = K>>(mut self, keys: I) -> Self {
        self.keys = Some(keys.into_iter().collect());
        self
    }

    /// Requires at least one of these tags.
    pub fn some_tag<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.some_tag = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Requires all of these tags.
    pub fn every_tag<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.every_tag = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.keys.is_none() && self.some_tag.is_none() && self.every_tag.is_none()
    }

    /// Checks the tag criteria against an entry. Key criteria are resolved by
    /// the engine, which knows the identifiers.
    pub(crate) fn matches_tags<V>(&self, entry: &Entry<K, V>) -> bool {
        if let Some(some) = &self.some_tag {
            if !some.iter().any(|t| entry.has_tag(t)) {
                return false;
            }
        }
        if let Some(every) = &self.every_tag {
            if !every.iter().all(|t| entry.has_tag(t)) {
                return false;
            }
        }
        true
    }
}

// == Finder ==
type Predicate<K, V> = Box<dyn Fn(&Entry<K, V>) -> bool + Send + Sync>;

/// Selects entries for `Cache::find` and `Cache::remove_by_finder`.
pub enum Finder<K, V> {
    /// Arbitrary predicate applied to every live entry
    Predicate(Predicate<K, V>),
    /// Structured key/tag criteria
    Filter(EntryFilter<K>),
}

impl<K, V> Finder<K, V> {
    /// Wraps a closure as a predicate finder.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Entry<K, V>) -> bool + Send + Sync + 'static,
    {
        Finder::Predicate(Box::new(f))
    }
}

impl<K, V> From<EntryFilter<K>> for Finder<K, V> {
    fn from(filter: EntryFilter<K>) -> Self {
        Finder::Filter(filter)
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Finder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finder::Predicate(_) => f.write_str("Finder::Predicate(..)"),
            Finder::Filter(filter) => f.debug_tuple("Finder::Filter").field(filter).finish(),
        }
    }
}
