//! Process environment connector.

use super::priority;
use crate::config::{Source, Value, ValueMap};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type KeyMapping = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Reads configuration from environment variables.
///
/// With the default mapping, `APP_DATABASE_HOST` under prefix `APP_` becomes
/// `database.host`.
#[derive(Clone)]
pub struct EnvSource {
    prefix: String,
    separator: String,
    priority: i32,
    key_mapping: Option<KeyMapping>,
}

impl EnvSource {
    /// Every variable in the environment, mapped with the default rules.
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            separator: "_".to_string(),
            priority: priority::ENV,
            key_mapping: None,
        }
    }

    /// Only variables starting with `prefix`. The prefix is stripped from keys.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Segment separator replaced by `.` in keys. Empty disables replacement.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Override the default `priority::ENV`.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Replace the default key mapping. The closure receives the full
    /// variable name; returning an empty string drops the variable.
    pub fn with_key_mapping<F>(mut self, mapping: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.key_mapping = Some(Arc::new(mapping));
        self
    }

    /// Map a set of `(name, value)` pairs as `load` would map the process
    /// environment.
    pub fn collect<I, K, V>(&self, vars: I) -> ValueMap
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        vars.into_iter()
            .filter(|(name, _)| name.as_ref().starts_with(&self.prefix))
            .filter_map(|(name, value)| {
                let key = self.map_key(name.as_ref());
                (!key.is_empty()).then(|| (key, Value::new(value)))
            })
            .collect()
    }

    fn map_key(&self, name: &str) -> String {
        if let Some(mapping) = &self.key_mapping {
            return mapping(name);
        }

        let stripped = name.strip_prefix(self.prefix.as_str()).unwrap_or(name);
        let lowered = stripped.to_lowercase();
        if self.separator.is_empty() {
            lowered
        } else {
            lowered.replace(&self.separator.to_lowercase(), ".")
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSource")
            .field("prefix", &self.prefix)
            .field("separator", &self.separator)
            .field("priority", &self.priority)
            .field("custom_mapping", &self.key_mapping.is_some())
            .finish()
    }
}

#[async_trait]
impl Source for EnvSource {
    fn name(&self) -> &str {
        "env"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn load(&self) -> anyhow::Result<ValueMap> {
        let vars = std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        });
        let values = self.collect(vars);
        debug!(prefix = %self.prefix, keys = values.len(), "Collected environment variables");
        Ok(values)
    }
}
