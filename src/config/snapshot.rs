//! Immutable configuration snapshots.
//!
//! A [`Config`] is built once from a merge and never mutated afterwards. The
//! manager publishes snapshots behind an `Arc`, so readers holding one always
//! see a complete, consistent mapping even while a reload is in progress.

use super::value::{Value, ValueMap};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

/// A fully merged, read-only configuration mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    data: ValueMap,
}

impl Config {
    /// Wrap an already-merged map.
    pub fn new(data: ValueMap) -> Self {
        Self { data }
    }

    /// An empty snapshot, as published before the first load.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Raw value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Canonical text of `key`, or `default` when absent.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(Value::as_string)
            .unwrap_or_else(|| default.to_string())
    }

    /// `i32` at `key`; unparseable or out-of-range values yield `default`.
    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get(key).map_or(default, |v| v.as_int(default))
    }

    /// `i64` at `key`, or `default`.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).map_or(default, |v| v.as_i64(default))
    }

    /// `f64` at `key`, or `default`.
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).map_or(default, |v| v.as_f64(default))
    }

    /// Boolean at `key`; text must be `true`, `false`, `1` or `0`, any case.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).map_or(default, |v| v.as_bool(default))
    }

    /// Duration at `key`, e.g. `"10s"`, `"5m"` or `"1h30m"`.
    pub fn get_duration(&self, key: &str, default: Duration) -> Duration {
        self.get(key).map_or(default, |v| v.as_duration(default))
    }

    /// String list at `key`; accepts JSON arrays or comma-separated text.
    pub fn get_string_slice(&self, key: &str, default: Vec<String>) -> Vec<String> {
        match self.get(key) {
            Some(v) => v.as_string_slice(default),
            None => default,
        }
    }

    /// String map at `key`; accepts JSON objects.
    pub fn get_string_map(
        &self,
        key: &str,
        default: HashMap<String, String>,
    ) -> HashMap<String, String> {
        match self.get(key) {
            Some(v) => v.as_string_map(default),
            None => default,
        }
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether `key` is present.
    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Keys under `prefix.` with the prefix stripped.
    ///
    /// `subset("database")` turns `database.host` into `host`. A key equal to
    /// the prefix itself is not included.
    pub fn subset(&self, prefix: &str) -> Config {
        let scope = format!("{prefix}.");
        let data = self
            .data
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&scope)
                    .map(|rest| (rest.to_string(), value.clone()))
            })
            .collect();
        Config::new(data)
    }

    /// Sorted keys that were added, removed or changed in `newer`.
    pub fn changed_keys(&self, newer: &Config) -> Vec<String> {
        let all: BTreeSet<&String> = self.data.keys().chain(newer.data.keys()).collect();
        all.into_iter()
            .filter(|key| self.data.get(*key) != newer.data.get(*key))
            .cloned()
            .collect()
    }
}

impl From<ValueMap> for Config {
    fn from(data: ValueMap) -> Self {
        Self::new(data)
    }
}

impl Serialize for Config {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sorted: BTreeMap<&String, &Value> = self.data.iter().collect();
        sorted.serialize(serializer)
    }
}
