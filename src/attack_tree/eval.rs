//! Tree evaluation.
//!
//! One depth-first pass, children before parents:
//!
//! 1. Evaluate every child.
//! 2. The node is reachable if it has no children or any child's query
//!    returned rows.
//! 3. A reachable node runs its own query: no rows → `NOT_POSSIBLE`,
//!    rows → `POSSIBLE`. An unreachable node stays `NOT_EXECUTED`.
//!
//! The first query failure marks that node `ERROR` and stops the pass. Nodes
//! evaluated before it keep their state.

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::error::QueryError;
use crate::query::{Binding, QueryExecutor};

use super::{AttackNode, AttackTree, ExecutionState};

/// Evaluation result for one node, mirroring the tree's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluatedNode {
    pub description: String,
    pub query: String,
    #[serde(rename = "execution status")]
    pub state: ExecutionState,
    /// Rows returned by the node's query, if it ran.
    #[serde(rename = "execution result")]
    pub result: Option<Vec<Binding>>,
    pub children: Vec<EvaluatedNode>,
}

impl EvaluatedNode {
    fn pending(node: &AttackNode) -> Self {
        Self {
            description: node.description.clone(),
            query: node.query.clone(),
            state: ExecutionState::NotExecuted,
            result: None,
            children: node.children.iter().map(Self::pending).collect(),
        }
    }

    /// Follow a path of child indices from this node.
    pub fn node_at(&self, path: &[usize]) -> Option<&EvaluatedNode> {
        path.iter()
            .try_fold(self, |node, &i| node.children.get(i))
    }

    /// All nodes of this subtree, pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &EvaluatedNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// The node whose query failed, and why.
#[derive(Debug, Error, Diagnostic)]
#[error("attack tree node \"{description}\" ({query}) failed")]
#[diagnostic(
    code(devprivops::tree::node_failed),
    help("Nodes evaluated before this one keep their state; the rest of the tree was skipped.")
)]
pub struct NodeFailure {
    /// Child indices from the root to the failing node.
    pub path: Vec<usize>,
    pub description: String,
    pub query: String,
    #[source]
    #[diagnostic_source]
    pub source: QueryError,
}

/// Outcome of one evaluation pass.
#[derive(Debug)]
pub struct TreeOutcome {
    pub root: EvaluatedNode,
    pub failure: Option<NodeFailure>,
}

impl TreeOutcome {
    /// Whether the modeled attack or harm is possible.
    pub fn is_possible(&self) -> bool {
        self.root.state == ExecutionState::Possible
    }
}

/// Evaluates trees against a query executor.
pub struct TreeEvaluator<'a, E: QueryExecutor + ?Sized> {
    executor: &'a E,
}

impl<'a, E: QueryExecutor + ?Sized> TreeEvaluator<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    pub fn evaluate(&self, tree: &AttackTree) -> TreeOutcome {
        let mut root = EvaluatedNode::pending(&tree.root);
        let mut path = Vec::new();
        let failure = self.visit(&tree.root, &mut root, &mut path).err();
        TreeOutcome { root, failure }
    }

    /// Evaluate `node` into `out`. Returns whether its query returned rows.
    fn visit(
        &self,
        node: &AttackNode,
        out: &mut EvaluatedNode,
        path: &mut Vec<usize>,
    ) -> Result<bool, NodeFailure> {
        let mut reachable = node.children.is_empty();
        for (i, (child, child_out)) in node.children.iter().zip(&mut out.children).enumerate() {
            path.push(i);
            reachable |= self.visit(child, child_out, path)?;
            path.pop();
        }

        if !reachable {
            tracing::debug!(node = %node.description, "unreachable");
            return Ok(false);
        }

        match self.executor.execute(&node.query) {
            Ok(rows) => {
                let possible = !rows.is_empty();
                out.state = if possible {
                    tracing::info!(node = %node.description, rows = rows.len(), "POSSIBLE");
                    ExecutionState::Possible
                } else {
                    tracing::info!(node = %node.description, "NOT POSSIBLE");
                    ExecutionState::NotPossible
                };
                out.result = Some(rows);
                Ok(possible)
            }
            Err(source) => {
                out.state = ExecutionState::Error;
                tracing::error!(node = %node.description, query = %node.query, error = %source, "node failed");
                Err(NodeFailure {
                    path: path.clone(),
                    description: node.description.clone(),
                    query: node.query.clone(),
                    source,
                })
            }
        }
    }
}
