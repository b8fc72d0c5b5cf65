//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::collections::HashSet;
use std::time::Duration;

// == Cache Entry ==
/// A single cached association with its tags and expiration metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<K, V> {
    /// The key as supplied by the caller
    pub key: K,
    /// The stored value
    pub value: V,
    /// Labels attached at creation
    pub tags: HashSet<String>,
    /// TTL in effect at creation, None = never expires
    pub cache_time: Option<Duration>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<i64>,
    /// Whether reads slide the expiration forward
    pub refresh: bool,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates a new entry stamped at `now`.
    ///
    /// A zero or `Duration::MAX` TTL is stored as `None` (never expires).
    pub fn new<I, S>(
        key: K,
        value: V,
        tags: I,
        cache_time: Option<Duration>,
        refresh: bool,
        now: i64,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cache_time = finite_ttl(cache_time);
        Self {
            key,
            value,
            tags: tags.into_iter().map(Into::into).collect(),
            cache_time,
            expires_at: expiry_from(now, cache_time),
            refresh,
            created_at: now,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry stays live up to and including its expiration timestamp; it is
    /// expired only once `now` is strictly past it.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires) => expires < now,
            None => false,
        }
    }

    /// Returns true if the entry never expires.
    pub fn is_infinite(&self) -> bool {
        self.expires_at.is_none()
    }

    // == Touch ==
    /// Slides the expiration to `now + cache_time`.
    ///
    /// No-op for entries that never expire. Returns true if the entry changed.
    pub fn touch(&mut self, now: i64) -> bool {
        if self.cache_time.is_none() {
            return false;
        }
        self.expires_at = expiry_from(now, self.cache_time);
        true
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self, now: i64) -> Option<u64> {
        self.expires_at
            .map(|expires| u64::try_from(expires.saturating_sub(now)).unwrap_or(0))
    }

    /// Returns true if the entry carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

// == Utility Functions ==
/// Maps the "never expires" spellings (zero, `Duration::MAX`) to `None`.
pub(crate) fn finite_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|t| !t.is_zero() && *t != Duration::MAX)
}

/// Computes `now + ttl` in milliseconds, saturating at `i64::MAX`.
fn expiry_from(now: i64, ttl: Option<Duration>) -> Option<i64> {
    let ms = i64::try_from(ttl?.as_millis()).unwrap_or(i64::MAX);
    Some(now.saturating_add(ms))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_000_000;

    fn entry(ttl: Option<Duration>) -> Entry<&'static str, &'static str> {
        Entry::new("k", "v", ["a", "b"], ttl, false, NOW)
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = entry(None);

        assert_eq!(entry.value, "v");
        assert!(entry.expires_at.is_none());
        assert!(entry.is_infinite());
        assert!(!entry.is_expired(i64::MAX));
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = entry(Some(Duration::from_secs(60)));

        assert_eq!(entry.expires_at, Some(NOW + 60_000));
        assert_eq!(entry.created_at, NOW);
        assert!(!entry.is_expired(NOW));
        assert!(entry.has_tag("a"));
        assert!(!entry.has_tag("c"));
    }

    #[test]
    fn test_zero_and_max_ttl_never_expire() {
        for ttl in [Duration::ZERO, Duration::MAX] {
            let entry = entry(Some(ttl));
            assert!(entry.cache_time.is_none());
            assert!(entry.is_infinite());
        }
    }

    #[test]
    fn test_overflowing_ttl_saturates() {
        let mut entry = Entry::new(
            "k",
            "v",
            Vec::<String>::new(),
            Some(Duration::from_secs(u64::MAX / 2)),
            false,
            NOW,
        );
        assert_eq!(entry.expires_at, Some(i64::MAX));
        assert!(!entry.is_infinite());
        assert!(!entry.is_expired(NOW));

        assert!(entry.touch(i64::MAX - 10));
        assert_eq!(entry.expires_at, Some(i64::MAX));
        assert!(entry.cache_time.is_some());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = entry(Some(Duration::from_millis(100)));

        assert!(!entry.is_expired(NOW + 100), "Live at the exact expiry");
        assert!(entry.is_expired(NOW + 101), "Expired strictly after");
    }

    #[test]
    fn test_touch_slides_expiry() {
        let mut entry = entry(Some(Duration::from_millis(100)));

        assert!(entry.touch(NOW + 50));
        assert_eq!(entry.expires_at, Some(NOW + 150));
    }

    #[test]
    fn test_touch_is_noop_for_infinite_entries() {
        let mut entry = entry(None);

        assert!(!entry.touch(NOW + 50));
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn test_ttl_remaining_ms() {
        let finite = entry(Some(Duration::from_secs(10)));
        let infinite = entry(None);

        assert_eq!(finite.ttl_remaining_ms(NOW), Some(10_000));
        assert_eq!(finite.ttl_remaining_ms(NOW + 20_000), Some(0));
        assert!(infinite.ttl_remaining_ms(NOW).is_none());
    }
}
