//! Format-agnostic document model
//!
//! Every tool document is read into a [`serde_json::Value`] tree regardless of
//! its on-disk syntax, merged in that shape, and written back in the syntax it
//! came from.

use serde_json::{Map, Value};
use toml::{Table as TomlTable, Value as TomlValue};

/// On-disk syntax of a tool configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Json => "JSON",
            Format::Yaml => "YAML",
            Format::Toml => "TOML",
        }
    }

    /// Parse `content` into a document tree.
    ///
    /// Returns `None` when the content is not valid in this format. Blank
    /// content parses to an empty mapping.
    pub fn parse(&self, content: &str) -> Option<Value> {
        if content.trim().is_empty() {
            return Some(Value::Object(Map::new()));
        }

        match self {
            Format::Json => serde_json::from_str(content).ok(),
            Format::Yaml => serde_yaml::from_str::<serde_yaml::Value>(content)
                .ok()
                .and_then(|yaml| serde_json::to_value(yaml).ok()),
            Format::Toml => toml::from_str::<TomlTable>(content)
                .ok()
                .map(|table| toml_to_json_value(&TomlValue::Table(table))),
        }
    }

    /// Serialize a document tree in this format.
    pub fn serialize(&self, document: &Value) -> Result<String, String> {
        match self {
            Format::Json => serde_json::to_string_pretty(document)
                .map(|mut out| {
                    out.push('\n');
                    out
                })
                .map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::to_string(document).map_err(|e| e.to_string()),
            Format::Toml => match json_to_toml_value(document) {
                Some(TomlValue::Table(table)) => {
                    toml::to_string_pretty(&table).map_err(|e| e.to_string())
                }
                _ => Err("TOML documents must be tables at the root".to_string()),
            },
        }
    }
}

/// Convert TOML value recursively to JSON value for unified parsing APIs
pub fn toml_to_json_value(value: &TomlValue) -> Value {
    match value {
        TomlValue::String(s) => Value::String(s.clone()),
        TomlValue::Integer(i) => Value::from(*i),
        TomlValue::Float(f) => Value::from(*f),
        TomlValue::Boolean(b) => Value::Bool(*b),
        TomlValue::Datetime(d) => Value::String(d.to_string()),
        TomlValue::Array(arr) => Value::Array(arr.iter().map(toml_to_json_value).collect()),
        TomlValue::Table(table) => Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json_value(v)))
                .collect(),
        ),
    }
}

/// Convert a JSON value to TOML. TOML has no null, so nulls are dropped.
pub fn json_to_toml_value(value: &Value) -> Option<TomlValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(TomlValue::Boolean(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(TomlValue::Integer)
            .or_else(|| n.as_f64().map(TomlValue::Float)),
        Value::String(s) => Some(TomlValue::String(s.clone())),
        Value::Array(arr) => Some(TomlValue::Array(
            arr.iter().filter_map(json_to_toml_value).collect(),
        )),
        Value::Object(obj) => Some(TomlValue::Table(
            obj.iter()
                .filter_map(|(k, v)| json_to_toml_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}
