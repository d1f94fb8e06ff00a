//! Flat string-map comparison utilities.
//!
//! Rule options, header sets and JSON bodies are all compared as flat
//! string-to-string maps. [`FlatMap`] keeps entries in authoring order,
//! because some comparisons (and the first-key check in rule validation)
//! depend on it.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Insertion-ordered map of string keys to string values.
///
/// Inserting an existing key overwrites its value in place. [`FlatMap::append`]
/// keeps repeated keys, which header sets need; lookups see the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatMap {
    entries: Vec<(String, String)>,
}

impl FlatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Add an entry even when `key` is already present.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|(k, _)| k.as_str())
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

    /// Parse JSON text as a flat object whose values are all strings.
    ///
    /// Anything else (arrays, nested objects, numbers, invalid JSON)
    /// yields `None`.
    pub fn from_json_text(text: &str) -> Option<FlatMap> {
        serde_json::from_str(text).ok()
    }

    /// Like [`FlatMap::from_json_text`], but repeated keys are all kept.
    pub fn from_json_text_repeated(text: &str) -> Option<FlatMap> {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        let map = (&mut deserializer)
            .deserialize_map(FlatMapVisitor { keep_repeats: true })
            .ok()?;
        deserializer.end().ok()?;
        Some(map)
    }

    /// Positional equality: same length and the same key/value pair at
    /// every index. Two maps holding the same pairs in a different order
    /// are NOT equal.
    pub fn positional_eq(&self, other: &FlatMap) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().zip(&other.entries).all(|(a, b)| a == b)
    }

    /// True when every entry of `self` exists in `other` with an equal
    /// value. Order-independent.
    pub fn is_subset_of(&self, other: &FlatMap) -> bool {
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FlatMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for FlatMap {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl Serialize for FlatMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct FlatMapVisitor {
    keep_repeats: bool,
}

impl<'de> Visitor<'de> for FlatMapVisitor {
    type Value = FlatMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of string keys to string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FlatMap, A::Error> {
        let mut map = FlatMap::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            if self.keep_repeats {
                map.append(key, value);
            } else {
                map.insert(key, value);
            }
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for FlatMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FlatMapVisitor {
            keep_repeats: false,
        })
    }
}

/// Replace the first occurrence of `from` in `haystack` with `to`.
///
/// An empty `from` leaves the input unchanged.
pub fn replace_first(haystack: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return haystack.to_string();
    }
    match haystack.find(from) {
        Some(pos) => {
            let mut out = String::with_capacity(haystack.len() - from.len() + to.len());
            out.push_str(&haystack[..pos]);
            out.push_str(to);
            out.push_str(&haystack[pos + from.len()..]);
            out
        }
        None => haystack.to_string(),
    }
}
