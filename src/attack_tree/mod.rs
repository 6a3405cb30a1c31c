//! Attack and harm trees.
//!
//! A tree models a threat as a hierarchy of conditions. Each node names a
//! query whose non-empty result means "this condition holds in the system".
//! Children are preconditions of their parent; a parent is only checked once
//! at least one of them holds (OR-gate).
//!
//! ```yaml
//! description: Personal data leaks to third parties
//! query: attack_trees/queries/leak.rq
//! children:
//!   - description: Data flows to an external entity
//!     query: attack_trees/queries/external_flow.rq
//!     children: []
//! ```
//!
//! The parsed tree is never mutated. Evaluation ([`eval`]) produces a
//! separate [`eval::EvaluatedNode`] mirror carrying states and results.

pub mod eval;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::Value;
use crate::error::{TreeError, TreeResult};

/// Evaluation state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// Not evaluated. After a completed pass this means unreachable.
    NotExecuted,
    /// The node's query returned no rows.
    NotPossible,
    /// The node's query returned at least one row.
    Possible,
    /// Running the node's query failed.
    Error,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::NotExecuted => "NOT_EXECUTED",
            ExecutionState::NotPossible => "NOT_POSSIBLE",
            ExecutionState::Possible => "POSSIBLE",
            ExecutionState::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One condition in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackNode {
    pub description: String,
    /// Query reference, relative to the configuration roots.
    pub query: String,
    pub children: Vec<AttackNode>,
}

impl AttackNode {
    pub fn leaf(description: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            query: query.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<AttackNode>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(AttackNode::size).sum::<usize>()
    }

    fn from_value(value: &Value, path: &str) -> TreeResult<Self> {
        let map = match value {
            Value::Mapping(map) => map,
            other => {
                return Err(TreeError::TypeMismatch {
                    path: path.to_string(),
                    expected: "mapping",
                    found: other.kind(),
                });
            }
        };

        let description = string_field(map, "description", path)?;
        let query = string_field(map, "query", path)?;
        let children = match required(map, "children", path)? {
            Value::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Self::from_value(item, &format!("{path}.children[{i}]")))
                .collect::<TreeResult<Vec<_>>>()?,
            other => {
                return Err(TreeError::TypeMismatch {
                    path: format!("{path}.children"),
                    expected: "sequence",
                    found: other.kind(),
                });
            }
        };

        Ok(Self {
            description,
            query,
            children,
        })
    }
}

fn required<'v>(
    map: &'v BTreeMap<String, Value>,
    field: &'static str,
    path: &str,
) -> TreeResult<&'v Value> {
    match map.get(field) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(TreeError::MissingField {
            field,
            path: path.to_string(),
        }),
    }
}

fn string_field(
    map: &BTreeMap<String, Value>,
    field: &'static str,
    path: &str,
) -> TreeResult<String> {
    let value = required(map, field, path)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| TreeError::TypeMismatch {
            path: format!("{path}.{field}"),
            expected: "string",
            found: value.kind(),
        })
}

/// A whole tree, identified by its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackTree {
    pub root: AttackNode,
}

impl AttackTree {
    pub fn new(root: AttackNode) -> Self {
        Self { root }
    }

    /// Build a tree from a parsed document. Unknown fields are ignored.
    pub fn from_value(value: &Value) -> TreeResult<Self> {
        AttackNode::from_value(value, "$").map(Self::new)
    }

    pub fn from_yaml_str(text: &str, origin: &str) -> TreeResult<Self> {
        Self::from_value(&Value::from_yaml_str(text, origin)?)
    }

    /// Read a tree description (YAML or JSON).
    pub fn read(path: &Path) -> TreeResult<Self> {
        Self::from_value(&Value::read(path)?)
    }
}
