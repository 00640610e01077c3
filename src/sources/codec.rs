//! JSON/YAML decoding and nested-to-dotted flattening.

use crate::config::{Value, ValueMap};
use anyhow::{Context, Result, bail};
use std::path::Path;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Detect the format from a file extension (`.json`, `.yaml`, `.yml`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }

    /// Decode a document. The root must be a mapping; an empty YAML document
    /// decodes to an empty mapping.
    pub fn decode(self, content: &str) -> Result<serde_json::Value> {
        let doc: serde_json::Value = match self {
            Format::Json => serde_json::from_str(content).context("Failed to parse JSON")?,
            Format::Yaml => {
                if content.trim().is_empty() {
                    return Ok(serde_json::Value::Object(Default::default()));
                }
                serde_yaml::from_str(content).context("Failed to parse YAML")?
            }
        };

        match doc {
            serde_json::Value::Object(_) => Ok(doc),
            serde_json::Value::Null if self == Format::Yaml => {
                Ok(serde_json::Value::Object(Default::default()))
            }
            other => bail!("{} document root must be a mapping, got {}", self, kind_of(&other)),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Json => write!(f, "JSON"),
            Format::Yaml => write!(f, "YAML"),
        }
    }
}

fn kind_of(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "sequence",
        serde_json::Value::Object(_) => "mapping",
    }
}

/// Flatten nested objects into dot-delimited keys.
///
/// Empty nested objects contribute no keys. Arrays and scalars become values
/// as-is.
pub fn flatten(doc: &serde_json::Value) -> ValueMap {
    let mut out = ValueMap::new();
    flatten_into(&mut out, "", doc);
    out
}

fn flatten_into(out: &mut ValueMap, prefix: &str, node: &serde_json::Value) {
    match node {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(out, &path, child);
            }
        }
        leaf if !prefix.is_empty() => {
            out.insert(prefix.to_string(), Value::from(leaf.clone()));
        }
        // A non-object root has no key to live under.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path(Path::new("a/b.json")), Some(Format::Json));
        assert_eq!(Format::from_path(Path::new("b.YAML")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("b.yml")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("b.toml")), None);
        assert_eq!(Format::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_decode_yaml_and_empty() {
        let doc = Format::Yaml.decode("server:\n  port: 8080\n").unwrap();
        assert_eq!(doc, json!({"server": {"port": 8080}}));
        assert_eq!(Format::Yaml.decode("").unwrap(), json!({}));
    }

    #[test]
    fn test_decode_rejects_non_mapping_root() {
        let err = Format::Json.decode("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("must be a mapping"));
        assert!(Format::Yaml.decode("- a\n- b\n").is_err());
        assert!(Format::Json.decode("{not json").is_err());
    }

    #[test]
    fn test_flatten_nested() {
        let doc = json!({
            "database": {"host": "localhost", "port": 5432, "tls": {"enabled": true}},
            "tags": ["a", "b"],
            "empty": {},
            "name": "svc"
        });
        let flat = flatten(&doc);
        assert_eq!(flat.len(), 5);
        assert_eq!(flat["database.host"], Value::from("localhost"));
        assert_eq!(flat["database.port"], Value::Int(5432));
        assert_eq!(flat["database.tls.enabled"], Value::Bool(true));
        assert_eq!(flat["tags"].as_string_slice(vec![]), vec!["a", "b"]);
        assert!(!flat.contains_key("empty"));
    }
}
