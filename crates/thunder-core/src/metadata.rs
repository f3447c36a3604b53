// crates/thunder-core/src/metadata.rs
//
// CallMetadata: the call-scoped, case-insensitive key/value multimap shared by
// the native RPC transport and the HTTP/GraphQL gateways.

use serde::Serialize;

/// Metadata key carrying the bearer credential.
pub const AUTHORIZATION: &str = "authorization";

/// Metadata key AuthStage publishes the verified subject under.
pub const CURRENT_USER: &str = "current_user";

const BEARER_PREFIX: &str = "bearer ";

/// Case-insensitive metadata multimap.
///
/// Keys are lower-cased on insert and values keep insertion order. The map is
/// treated as immutable once attached to a call: stages derive an augmented
/// copy with [`CallMetadata::with_entry`] rather than mutating in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallMetadata {
    entries: Vec<(String, String)>,
}

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(key, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut md = Self::new();
        for (key, value) in pairs {
            md.append(key.as_ref(), value);
        }
        md
    }

    /// Collect the UTF-8 entries of an HTTP header map, without any filtering.
    pub fn from_headers(headers: &http::HeaderMap) -> Self {
        let mut md = Self::new();
        for (name, value) in headers.iter() {
            if let Ok(value) = value.to_str() {
                md.append(name.as_str(), value);
            }
        }
        md
    }

    fn append(&mut self, key: &str, value: impl Into<String>) {
        self.entries.push((key.to_ascii_lowercase(), value.into()));
    }

    /// Return a copy of this map with one more entry appended.
    pub fn with_entry(&self, key: &str, value: impl Into<String>) -> Self {
        let mut md = self.clone();
        md.append(key, value);
        md
    }

    /// Return a copy with every entry of `key` removed.
    pub fn without(&self, key: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| !k.eq_ignore_ascii_case(key))
                .cloned()
                .collect(),
        }
    }

    /// Return a copy with every entry of `key` replaced by a single value.
    pub fn with_replaced(&self, key: &str, value: impl Into<String>) -> Self {
        let mut md = self.without(key);
        md.append(key, value);
        md
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The bearer credential, with an optional case-insensitive `Bearer `
    /// prefix removed. Blank values count as absent.
    pub fn bearer_token(&self) -> Option<&str> {
        let raw = self.get(AUTHORIZATION)?.trim_start();
        let token = match raw.get(..BEARER_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => {
                raw[BEARER_PREFIX.len()..].trim()
            }
            _ => raw.trim(),
        };
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    /// The subject published by the authentication stage, if any.
    pub fn current_user(&self) -> Option<&str> {
        self.get(CURRENT_USER)
    }
}
