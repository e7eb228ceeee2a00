//! Cache key derivation.
//!
//! A request is normalized (falsy and blacklisted fields dropped, keys
//! sorted), serialized as compact JSON and hashed with MD5. The 128-bit
//! digest names the entry file; its first byte (two hex chars) picks one
//! of 256 shard directories.
//!
//! MD5 is used as a content address, not as a security boundary.
//! Collisions are accepted as negligible at the sizes a model cache
//! reaches.

use std::fmt;
use std::path::PathBuf;

use md5::{Digest, Md5};
use serde_json::{Map, Value};

/// Fields dropped from requests and params before hashing or persisting.
pub const DEFAULT_BLACKLIST: &[&str] = &["api_key"];

/// Content address of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
}

impl CacheKey {
    /// Hash an already normalized request.
    pub fn from_normalized(normalized: &Value) -> Self {
        Self {
            digest: digest(normalized),
        }
    }

    /// 32-char lowercase hex digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Two-char shard directory name.
    pub fn shard(&self) -> &str {
        &self.digest[..2]
    }

    /// Entry path relative to the cache root: `<shard>/<digest>.json`.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.shard()).join(format!("{}.json", self.digest))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

/// Normalizes and hashes requests into [`CacheKey`]s.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    blacklist: Vec<String>,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_BLACKLIST.iter().copied())
    }
}

impl KeyCodec {
    /// Create a codec that drops the given field names.
    pub fn new<I, S>(blacklist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blacklist: blacklist.into_iter().map(Into::into).collect(),
        }
    }

    /// Field names this codec drops.
    pub fn blacklist(&self) -> &[String] {
        &self.blacklist
    }

    /// Normalize a request with this codec's blacklist.
    pub fn normalize(&self, value: &Value) -> Value {
        normalize(value, &self.blacklist)
    }

    /// Normalize and hash a request.
    pub fn key(&self, request: &Value) -> CacheKey {
        CacheKey::from_normalized(&self.normalize(request))
    }
}

/// Drop falsy entries and blacklisted keys from maps, recursively.
///
/// Falsy means null, `false`, zero, the empty string, the empty array and
/// the empty object. Non-map values are returned unchanged. Map keys come
/// out in lexicographic order.
pub fn normalize(value: &Value, blacklist: &[String]) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .iter()
                .filter(|(k, v)| !is_falsy(v) && !blacklist.iter().any(|b| b == *k))
                .map(|(k, _)| k)
                .collect();
            keys.sort();

            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), normalize(&map[k], blacklist));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// MD5 of the canonical (compact, key-sorted) serialization, as hex.
pub fn digest(normalized: &Value) -> String {
    let canonical = canonical(normalized).to_string();
    Md5::digest(canonical.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Rebuild `value` with every object's keys inserted in sorted order, so
/// serialization is stable whichever map backing serde_json was built with.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digest_is_32_hex_chars() {
        let key = KeyCodec::default().key(&json!("hello"));
        assert_eq!(key.digest().len(), 32);
        assert!(key.digest().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn plain_string_digest_is_md5_of_json_text() {
        // `"hello"` including the quotes
        let key = KeyCodec::default().key(&json!("hello"));
        assert_eq!(key.digest(), "5deaee1c1332199e5b5bc7c5e4f7f0c2");
    }

    #[test]
    fn shard_is_digest_prefix() {
        let key = KeyCodec::default().key(&json!({"q": "what"}));
        assert_eq!(key.shard(), &key.digest()[..2]);
        assert_eq!(
            key.relative_path(),
            PathBuf::from(key.shard()).join(format!("{}.json", key.digest()))
        );
    }

    #[test]
    fn falsy_values_dropped() {
        let normalized = normalize(
            &json!({"a": 1, "b": null, "c": "", "d": [], "e": {}, "f": false, "g": 0}),
            &[],
        );
        assert_eq!(normalized, json!({"a": 1}));
    }

    #[test]
    fn nested_maps_normalized() {
        let normalized = normalize(
            &json!({"outer": {"api_key": "secret", "keep": "x", "empty": ""}}),
            &["api_key".to_string()],
        );
        assert_eq!(normalized, json!({"outer": {"keep": "x"}}));
    }

    #[test]
    fn arrays_pass_through() {
        let value = json!(["b", "a", null]);
        assert_eq!(normalize(&value, &[]), value);
    }

    #[test]
    fn canonical_sorts_inside_arrays() {
        let a = json!([{"y": 1, "x": 2}]);
        assert_eq!(canonical(&a).to_string(), r#"[{"x":2,"y":1}]"#);
    }
}
