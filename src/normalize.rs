//! Key Normalization Module
//!
//! Maps structured keys to stable string identifiers used by storage backends.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

// == Key Normalizer Trait ==
/// Turns a key into the identifier it is stored under.
///
/// Implementations must be deterministic: two keys the caller considers equal
/// must produce the same identifier, regardless of how their fields or map
/// entries were ordered when built.
pub trait KeyNormalizer<K: ?Sized>: Send + Sync {
    /// Returns the stable identifier for `key`.
    fn normalize(&self, key: &K) -> Result<String>;
}

// == JSON Key Normalizer ==
/// Default normalizer rendering keys as canonical JSON.
///
/// Keys go through `serde_json::Value` and every object is rebuilt with its
/// members sorted by name, so `{"a":1,"b":2}` and `{"b":2,"a":1}` both render
/// as `{"a":1,"b":2}` whatever map ordering `serde_json` was built with.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonKeyNormalizer;

impl<K> KeyNormalizer<K> for JsonKeyNormalizer
where
    K: Serialize + ?Sized,
{
    fn normalize(&self, key: &K) -> Result<String> {
        let value = canonicalize(serde_json::to_value(key)?);
        Ok(serde_json::to_string(&value)?)
    }
}

/// Recursively sorts object members by name. Array order is kept.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(name, member)| (name, canonicalize(member)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
