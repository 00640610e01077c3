//! Type-erased configuration values with total, default-on-failure coercion.
//!
//! A [`Value`] holds exactly one datum. Values built from strings treat the
//! string as the source of truth for every coercion; values built from richer
//! native data keep their type for exact-type reads and fall back to the
//! string-parsing rules otherwise.
//!
//! No coercion ever fails: a parse or type mismatch returns the caller's default.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Flat key → value mapping exchanged between sources, mergers and snapshots.
pub type ValueMap = HashMap<String, Value>;

/// A single configuration datum.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent datum (e.g. a YAML `~` or SQL `NULL`).
    #[default]
    Null,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
    StringList(Vec<String>),
    StringMap(HashMap<String, String>),
    /// Opaque native data a source could not map onto a narrower tag, such as
    /// mixed-type arrays or nested objects.
    Native(serde_json::Value),
}

impl Value {
    /// Build a value whose source of truth is the given string.
    pub fn new(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// The underlying datum, unconverted.
    pub fn raw(&self) -> &Self {
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical textual form. Native strings pass through untouched.
    pub fn as_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Duration(d) => format_duration(*d),
            Value::StringList(items) => serde_json::to_string(items).unwrap_or_default(),
            Value::StringMap(map) => {
                let sorted: BTreeMap<&String, &String> = map.iter().collect();
                serde_json::to_string(&sorted).unwrap_or_default()
            }
            Value::Native(v) => render_native(v),
        }
    }

    /// Coerce to `i32`; out-of-range integers fall back to `default`.
    pub fn as_int(&self, default: i32) -> i32 {
        self.to_i64()
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(default)
    }

    /// Coerce to `i64`, parsing strings.
    pub fn as_i64(&self, default: i64) -> i64 {
        self.to_i64().unwrap_or(default)
    }

    /// Coerce to `f64`, parsing strings.
    pub fn as_f64(&self, default: f64) -> f64 {
        self.to_f64().unwrap_or(default)
    }

    /// Coerce to `bool`. Strings accept `true`/`false` in any case, `1` and `0`.
    pub fn as_bool(&self, default: bool) -> bool {
        self.to_bool().unwrap_or(default)
    }

    /// Coerce to a [`Duration`]. Integers count nanoseconds; strings use the
    /// grammar accepted by [`parse_duration`].
    pub fn as_duration(&self, default: Duration) -> Duration {
        self.to_duration().unwrap_or(default)
    }

    /// Coerce to a list of strings.
    ///
    /// Strings are tried as a JSON array first, then split on commas with
    /// each piece trimmed and empty pieces dropped.
    pub fn as_string_slice(&self, default: Vec<String>) -> Vec<String> {
        match self {
            Value::StringList(items) => items.clone(),
            Value::Native(serde_json::Value::Array(items)) => {
                items.iter().map(render_native).collect()
            }
            Value::String(s) => parse_string_list(s).unwrap_or(default),
            _ => default,
        }
    }

    /// Coerce to a string map. Strings must hold a JSON object of strings.
    pub fn as_string_map(&self, default: HashMap<String, String>) -> HashMap<String, String> {
        match self {
            Value::StringMap(map) => map.clone(),
            Value::Native(serde_json::Value::Object(entries)) => entries
                .iter()
                .map(|(k, v)| (k.clone(), render_native(v)))
                .collect(),
            Value::String(s) => serde_json::from_str(s).unwrap_or(default),
            _ => default,
        }
    }

    /// Native JSON form of the datum. Durations render through their
    /// canonical text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Duration(d) => serde_json::Value::String(format_duration(*d)),
            Value::StringList(items) => serde_json::Value::from(items.clone()),
            Value::StringMap(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect(),
            ),
            Value::Native(v) => v.clone(),
        }
    }

    fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => truncate_float(*f),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn to_duration(&self) -> Option<Duration> {
        match self {
            Value::Duration(d) => Some(*d),
            Value::Int(nanos) => u64::try_from(*nanos).ok().map(Duration::from_nanos),
            Value::String(s) => parse_duration(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::StringList(items)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Value::StringList(items.into_iter().map(str::to_string).collect())
    }
}

impl From<HashMap<String, String>> for Value {
    fn from(map: HashMap<String, String>) -> Self {
        Value::StringMap(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Native(Json::Number(n))),
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) if items.iter().all(Json::is_string) => Value::StringList(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Json::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            Json::Object(entries) if entries.values().all(Json::is_string) => Value::StringMap(
                entries
                    .into_iter()
                    .filter_map(|(k, item)| match item {
                        Json::String(s) => Some((k, s)),
                        _ => None,
                    })
                    .collect(),
            ),
            other => Value::Native(other),
        }
    }
}

/// Render a native JSON element: strings raw, everything else as JSON text.
fn render_native(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_float(f: f64) -> Option<i64> {
    // i64::MAX is not representable; the upper bound must be exclusive.
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn parse_string_list(s: &str) -> Option<Vec<String>> {
    if let Ok(items) = serde_json::from_str::<Vec<String>>(s) {
        return Some(items);
    }

    let items: Vec<String> = s
        .split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect();

    if items.is_empty() { None } else { Some(items) }
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration such as `300ms`, `1.5h` or `2h45m`.
///
/// Grammar: an optional sign followed by one or more `<number><unit>` runs,
/// where the number may carry a fraction and the unit is one of `ns`, `us`,
/// `µs`, `μs`, `ms`, `s`, `m`, `h`. A bare `0` is accepted. Negative or
/// overflowing durations yield `None`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Some(Duration::ZERO);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_len = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            _ => return None,
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        total = total.checked_add(whole.checked_mul(scale)?)?;

        if !frac_part.is_empty() {
            // 18 digits keep numerator * scale well inside u128.
            let digits = &frac_part[..frac_part.len().min(18)];
            let numerator: u128 = digits.parse().ok()?;
            let denominator = 10u128.pow(digits.len() as u32);
            total = total.checked_add(numerator * scale / denominator)?;
        }
    }

    if negative && total > 0 {
        return None;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).ok()?;
    let nanos = (total % NANOS_PER_SEC) as u32;
    Some(Duration::new(secs, nanos))
}

/// Canonical compact text for a duration, e.g. `1h30m`, `1s500ms`, `0s`.
/// The output is always accepted by [`parse_duration`].
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    let secs = d.as_secs();
    let nanos = d.subsec_nanos();
    let parts = [
        (secs / 3_600, "h"),
        ((secs % 3_600) / 60, "m"),
        (secs % 60, "s"),
        (u64::from(nanos / 1_000_000), "ms"),
        (u64::from((nanos / 1_000) % 1_000), "us"),
        (u64::from(nanos % 1_000), "ns"),
    ];

    parts
        .iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| format!("{amount}{unit}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_to_int() {
        assert_eq!(Value::from("12345").as_int(0), 12345);
        assert_eq!(Value::from("-42").as_i64(0), -42);
        assert_eq!(Value::from("notanumber").as_int(99), 99);
        assert_eq!(Value::from(" 7").as_int(1), 1);
    }

    #[test]
    fn test_native_numbers_to_int() {
        assert_eq!(Value::from(42i64).as_int(0), 42);
        assert_eq!(Value::from(3.9).as_i64(0), 3);
        assert_eq!(Value::from(-3.9).as_i64(0), -3);
        assert_eq!(Value::from(f64::NAN).as_i64(5), 5);
        // Narrowing out of range falls back
        assert_eq!(Value::from(i64::MAX).as_int(-1), -1);
        assert_eq!(Value::from(i64::MAX).as_i64(0), i64::MAX);
        assert_eq!(Value::Null.as_int(8), 8);
        assert_eq!(Value::from(true).as_int(8), 8);
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(Value::from("3.25").as_f64(0.0), 3.25);
        assert_eq!(Value::from(4i64).as_f64(0.0), 4.0);
        assert_eq!(Value::from("1e3").as_f64(0.0), 1000.0);
        assert_eq!(Value::from("abc").as_f64(1.5), 1.5);
    }

    #[test]
    fn test_bool_coercion() {
        assert!(Value::from("true").as_bool(false));
        assert!(Value::from("TRUE").as_bool(false));
        assert!(Value::from("1").as_bool(false));
        assert!(!Value::from("False").as_bool(true));
        assert!(!Value::from("0").as_bool(true));
        assert!(Value::from("yes").as_bool(true));
        assert!(!Value::from("yes").as_bool(false));
        assert!(Value::from(true).as_bool(false));
        assert!(!Value::from(1i64).as_bool(false));
    }

    #[test]
    fn test_duration_coercion() {
        let fallback = Duration::from_secs(9);
        assert_eq!(
            Value::from("1h30m").as_duration(fallback),
            Duration::from_secs(5_400)
        );
        assert_eq!(Value::from("10s").as_duration(fallback), Duration::from_secs(10));
        assert_eq!(
            Value::from(1_500_000_000i64).as_duration(fallback),
            Duration::from_millis(1_500)
        );
        assert_eq!(Value::from(-1i64).as_duration(fallback), fallback);
        assert_eq!(Value::from("soon").as_duration(fallback), fallback);
        assert_eq!(
            Value::from(Duration::from_millis(5)).as_duration(fallback),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_parse_duration_grammar() {
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("-0s"), Some(Duration::ZERO));
        assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5_400)));
        assert_eq!(parse_duration(".5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2h45m10s"), Some(Duration::from_secs(9_910)));
        assert_eq!(parse_duration("1µs"), Some(Duration::from_micros(1)));
        assert_eq!(parse_duration("7us3ns"), Some(Duration::from_nanos(7_003)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("."), None);
    }

    #[test]
    fn test_format_duration_round_trips_through_parser() {
        let samples = [
            Duration::ZERO,
            Duration::from_secs(5_400),
            Duration::from_millis(1_500),
            Duration::from_nanos(1_001_001),
        ];
        assert_eq!(format_duration(Duration::from_secs(5_400)), "1h30m");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1s500ms");
        for d in samples {
            assert_eq!(parse_duration(&format_duration(d)), Some(d));
        }
    }

    #[test]
    fn test_string_slice_from_json_array() {
        assert_eq!(
            Value::from(r#"["x","y"]"#).as_string_slice(vec![]),
            vec!["x", "y"]
        );
    }

    #[test]
    fn test_string_slice_from_comma_list() {
        assert_eq!(
            Value::from("a, b ,c").as_string_slice(vec![]),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            Value::from(" , ,").as_string_slice(vec!["d".to_string()]),
            vec!["d"]
        );
        // Non-string JSON elements fall through to the comma split
        assert_eq!(Value::from("[1,2]").as_string_slice(vec![]), vec!["[1", "2]"]);
    }

    #[test]
    fn test_string_slice_from_native_lists() {
        assert_eq!(Value::from(vec!["a", "b"]).as_string_slice(vec![]), vec!["a", "b"]);
        assert_eq!(
            Value::from(json!([1, "two", true])).as_string_slice(vec![]),
            vec!["1", "two", "true"]
        );
        assert_eq!(Value::from(5i64).as_string_slice(vec!["z".into()]), vec!["z"]);
    }

    #[test]
    fn test_string_map_coercion() {
        let map = Value::from(r#"{"a":"1","b":"2"}"#).as_string_map(HashMap::new());
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert_eq!(map.len(), 2);

        let native = Value::from(json!({"port": 8080, "host": "db"})).as_string_map(HashMap::new());
        assert_eq!(native.get("port").map(String::as_str), Some("8080"));
        assert_eq!(native.get("host").map(String::as_str), Some("db"));

        let mut fallback = HashMap::new();
        fallback.insert("k".to_string(), "v".to_string());
        assert_eq!(Value::from("{not json").as_string_map(fallback.clone()), fallback);
        assert_eq!(Value::from(r#"{"a":1}"#).as_string_map(fallback.clone()), fallback);
    }

    #[test]
    fn test_as_string_canonical_forms() {
        assert_eq!(Value::Null.as_string(), "");
        assert_eq!(Value::from("plain").as_string(), "plain");
        assert_eq!(Value::from(42i64).as_string(), "42");
        assert_eq!(Value::from(2.5).as_string(), "2.5");
        assert_eq!(Value::from(false).as_string(), "false");
        assert_eq!(Value::from(vec!["a", "b"]).as_string(), r#"["a","b"]"#);
        assert_eq!(Value::from(json!([1, {"a": 2}])).as_string(), r#"[1,{"a":2}]"#);
        assert_eq!(Value::from(Duration::from_secs(90)).to_string(), "1m30s");
    }

    #[test]
    fn test_from_json_normalizes_tags() {
        assert_eq!(Value::from(json!(null)), Value::Null);
        assert_eq!(Value::from(json!(7)), Value::Int(7));
        assert_eq!(Value::from(json!(0.5)), Value::Float(0.5));
        assert_eq!(Value::from(json!("s")), Value::String("s".into()));
        assert_eq!(
            Value::from(json!(["a"])),
            Value::StringList(vec!["a".to_string()])
        );
        assert!(matches!(Value::from(json!({"a": "b"})), Value::StringMap(_)));
        assert!(matches!(Value::from(json!([1, 2])), Value::Native(_)));
    }

    #[test]
    fn test_serialize_uses_native_form() {
        let rendered = serde_json::to_string(&Value::from(Duration::from_secs(10))).unwrap();
        assert_eq!(rendered, r#""10s""#);
        let rendered = serde_json::to_string(&Value::from(3i64)).unwrap();
        assert_eq!(rendered, "3");
    }
}
