//! Priority merge of flat configuration maps.
//!
//! Maps are folded in the order given: for a key present in several inputs,
//! the value from the last input containing it wins. Keys present in a single
//! input are carried through unchanged. The manager always passes maps sorted
//! ascending by source priority, so "later" means "higher priority".

use super::value::ValueMap;

/// Strategy that folds an ordered list of maps into one.
pub trait Merger: Send + Sync {
    fn merge(&self, maps: Vec<ValueMap>) -> ValueMap;
}

/// Last-writer-wins merge. No validation, no type checks across inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMerger;

impl DefaultMerger {
    pub fn new() -> Self {
        Self
    }
}

impl Merger for DefaultMerger {
    fn merge(&self, maps: Vec<ValueMap>) -> ValueMap {
        merge_all(maps)
    }
}

/// Merge multiple maps in order, with later maps taking precedence.
///
/// # Example
/// ```
/// use stratum_config::config::{Value, ValueMap, merge_all};
///
/// let low: ValueMap = [("key".to_string(), Value::from("low"))].into();
/// let high: ValueMap = [("key".to_string(), Value::from("high"))].into();
/// let merged = merge_all([low, high]);
/// assert_eq!(merged["key"], Value::from("high"));
/// ```
pub fn merge_all(maps: impl IntoIterator<Item = ValueMap>) -> ValueMap {
    let mut maps = maps.into_iter();
    let Some(mut merged) = maps.next() else {
        return ValueMap::new();
    };
    for overlay in maps {
        merged.extend(overlay);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value::Value;

    fn map(entries: &[(&str, &str)]) -> ValueMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_merge_no_maps_is_empty() {
        assert!(DefaultMerger.merge(vec![]).is_empty());
    }

    #[test]
    fn test_merge_single_map_is_identity() {
        let only = map(&[("a", "1"), ("b", "2")]);
        assert_eq!(DefaultMerger.merge(vec![only.clone()]), only);
    }

    #[test]
    fn test_later_map_overrides() {
        let result = DefaultMerger.merge(vec![
            map(&[("a", "1"), ("b", "2")]),
            map(&[("b", "3"), ("c", "4")]),
        ]);
        assert_eq!(result, map(&[("a", "1"), ("b", "3"), ("c", "4")]));
    }

    #[test]
    fn test_last_of_many_wins() {
        let result = merge_all(vec![
            map(&[("k", "first")]),
            map(&[("other", "x")]),
            map(&[("k", "second")]),
            map(&[("k", "third")]),
        ]);
        assert_eq!(result.get("k"), Some(&Value::from("third")));
        assert_eq!(result.get("other"), Some(&Value::from("x")));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_no_type_checks_across_inputs() {
        let mut typed = ValueMap::new();
        typed.insert("port".into(), Value::from(8080i64));
        let result = merge_all(vec![typed, map(&[("port", "not-a-port")])]);
        assert_eq!(result.get("port"), Some(&Value::from("not-a-port")));
    }
}
