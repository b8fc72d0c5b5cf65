//! Configuration Module
//!
//! Engine-wide defaults for TTL, sweep cadence and `get_or_set` strictness,
//! loadable from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default sweep interval (5 minutes).
pub const DEFAULT_CLEAR_INTERVAL: Duration = Duration::from_secs(300);

// == Get-Or-Set Mode ==
/// How `Cache::get_or_set` behaves when callers race on the same absent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetOrSetMode {
    /// Check, compute and set are independent steps. Racing callers may each
    /// run their producer; the last write wins.
    #[default]
    Lax,
    /// Callers on the same key are serialized; only the first runs its
    /// producer and later ones read the stored value.
    ///
    /// A producer must not call `get_or_set` for its own key on the same
    /// cache; it would wait on itself forever.
    SingleFlight,
}

impl FromStr for GetOrSetMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lax" => Ok(GetOrSetMode::Lax),
            "single-flight" | "single_flight" | "singleflight" => Ok(GetOrSetMode::SingleFlight),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown get-or-set mode '{}'",
                other
            ))),
        }
    }
}

/// Cache configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL for entries set without one; None (or zero) = never expire
    pub cache_time: Option<Duration>,
    /// Background sweep interval; zero or `Duration::MAX` disables the sweep
    pub clear_interval: Duration,
    /// Race behavior of `get_or_set`
    pub get_or_set_mode: GetOrSetMode,
}

impl Config {
    /// Creates a new Config by loading values from environment variables,
    /// falling back to defaults for anything missing or unparsable.
    ///
    /// # Environment Variables
    /// - `CACHE_TIME_MS` - Default TTL in milliseconds (default: never expire)
    /// - `CLEAR_INTERVAL_MS` - Sweep interval in milliseconds (default: 300000)
    /// - `GET_OR_SET_MODE` - `lax` or `single-flight` (default: lax)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_time: env::var("CACHE_TIME_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .or(defaults.cache_time),
            clear_interval: env::var("CLEAR_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.clear_interval),
            get_or_set_mode: env::var("GET_OR_SET_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.get_or_set_mode),
        }
    }

    /// Like [`Config::from_env`], but reports unparsable values instead of
    /// silently using defaults.
    pub fn try_from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            cache_time: match env::var("CACHE_TIME_MS") {
                Ok(v) => Some(Duration::from_millis(parse_ms("CACHE_TIME_MS", &v)?)),
                Err(_) => defaults.cache_time,
            },
            clear_interval: match env::var("CLEAR_INTERVAL_MS") {
                Ok(v) => Duration::from_millis(parse_ms("CLEAR_INTERVAL_MS", &v)?),
                Err(_) => defaults.clear_interval,
            },
            get_or_set_mode: match env::var("GET_OR_SET_MODE") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.get_or_set_mode,
            },
        })
    }

    /// Sets the default TTL.
    pub fn with_cache_time(mut self, ttl: Duration) -> Self {
        self.cache_time = Some(ttl);
        self
    }

    /// Sets the sweep interval.
    pub fn with_clear_interval(mut self, interval: Duration) -> Self {
        self.clear_interval = interval;
        self
    }

    /// Sets the `get_or_set` race behavior.
    pub fn with_get_or_set_mode(mut self, mode: GetOrSetMode) -> Self {
        self.get_or_set_mode = mode;
        self
    }

    /// Returns the sweep interval, or None if the sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        if self.clear_interval.is_zero() || self.clear_interval == Duration::MAX {
            None
        } else {
            Some(self.clear_interval)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_time: None,
            clear_interval: DEFAULT_CLEAR_INTERVAL,
            get_or_set_mode: GetOrSetMode::Lax,
        }
    }
}

fn parse_ms(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| CacheError::InvalidConfig(format!("{} must be milliseconds, got '{}'", name, value)))
}
