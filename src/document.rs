//! Parsed document values.
//!
//! Descriptions, attack trees and configuration documents are read once into a
//! [`Value`] tree. Mapping keys are kept in a `BTreeMap`, so every consumer walks
//! them in lexicographic order and produces deterministic output.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{DocumentError, DocumentResult};

/// A scalar leaf of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    String(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl Scalar {
    /// Canonical text form: integers in decimal, booleans as `true`/`false`.
    ///
    /// Returns `None` for null.
    pub fn canonical(&self) -> Option<String> {
        match self {
            Scalar::String(s) => Some(s.clone()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Null => None,
        }
    }
}

/// A parsed document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Mapping(BTreeMap<String, Value>),
    Sequence(Vec<Value>),
    Scalar(Scalar),
}

impl Value {
    /// Short name of the node kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Mapping(_) => "mapping",
            Value::Sequence(_) => "sequence",
            Value::Scalar(Scalar::String(_)) => "string",
            Value::Scalar(Scalar::Int(_)) => "integer",
            Value::Scalar(Scalar::Bool(_)) => "boolean",
            Value::Scalar(Scalar::Null) => "null",
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Scalar(Scalar::Null))
    }

    /// JSON form, for schema validation.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;

        match self {
            Value::Mapping(map) => J::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Sequence(items) => J::Array(items.iter().map(Value::to_json).collect()),
            Value::Scalar(Scalar::String(s)) => J::String(s.clone()),
            Value::Scalar(Scalar::Int(i)) => J::from(*i),
            Value::Scalar(Scalar::Bool(b)) => J::Bool(*b),
            Value::Scalar(Scalar::Null) => J::Null,
        }
    }

    /// Parse YAML (or JSON) text. `origin` names the source in error messages.
    pub fn from_yaml_str(text: &str, origin: &str) -> DocumentResult<Self> {
        let raw: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| DocumentError::Yaml {
                path: origin.to_string(),
                message: e.to_string(),
            })?;
        Self::from_yaml(raw, "$")
    }

    /// Read and parse a YAML (or JSON) file.
    pub fn read(path: &Path) -> DocumentResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    /// Convert a raw `serde_yaml` value, rejecting shapes the compiler cannot express.
    pub fn from_yaml(raw: serde_yaml::Value, path: &str) -> DocumentResult<Self> {
        use serde_yaml::Value as Y;

        match raw {
            Y::Null => Ok(Value::Scalar(Scalar::Null)),
            Y::Bool(b) => Ok(Value::Scalar(Scalar::Bool(b))),
            Y::String(s) => Ok(Value::Scalar(Scalar::String(s))),
            Y::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Scalar(Scalar::Int(i))),
                None => Err(DocumentError::TypeMismatch {
                    path: path.to_string(),
                    expected: "string, integer or boolean",
                    found: if n.is_f64() { "float" } else { "out-of-range integer" },
                }),
            },
            Y::Sequence(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| Self::from_yaml(item, &format!("{path}[{i}]")))
                .collect::<DocumentResult<Vec<_>>>()
                .map(Value::Sequence),
            Y::Mapping(entries) => {
                let mut map = BTreeMap::new();
                for (k, v) in entries {
                    let key = mapping_key(k, path)?;
                    let child = Self::from_yaml(v, &format!("{path}.{key}"))?;
                    map.insert(key, child);
                }
                Ok(Value::Mapping(map))
            }
            Y::Tagged(_) => Err(DocumentError::TypeMismatch {
                path: path.to_string(),
                expected: "untagged value",
                found: "tagged value",
            }),
        }
    }
}

fn mapping_key(key: serde_yaml::Value, path: &str) -> DocumentResult<String> {
    use serde_yaml::Value as Y;

    let mismatch = |found| DocumentError::TypeMismatch {
        path: path.to_string(),
        expected: "scalar mapping key",
        found,
    };
    match key {
        Y::String(s) => Ok(s),
        Y::Bool(b) => Ok(b.to_string()),
        Y::Number(n) => n.as_i64().map(|i| i.to_string()).ok_or(mismatch("float")),
        Y::Null => Err(mismatch("null")),
        Y::Sequence(_) => Err(mismatch("sequence")),
        Y::Mapping(_) => Err(mismatch("mapping")),
        Y::Tagged(_) => Err(mismatch("tagged value")),
    }
}
