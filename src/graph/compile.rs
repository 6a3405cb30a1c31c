//! Document-to-graph compilation.
//!
//! Walks a [`Value`] depth-first and emits one [`Triple`] per scalar field and
//! one linking triple per nested mapping:
//!
//! ```text
//! a:                      <ROOT> <a> <aId> .
//!   id: aId               <aId>  <x> 1 .
//!   x: 1                  <ROOT> <tags> "p" .
//! tags: [p, q]            <ROOT> <tags> "q" .
//! ```
//!
//! Nested mappings are identified by their `id` field (which is consumed and
//! not emitted) or by a fresh anonymous identifier drawn from [`AnonIds`].
//! Sequence elements attach directly to the enclosing subject under the
//! sequence's key. Mapping keys are visited in lexicographic order, so output
//! is deterministic for a given document and counter state.

use std::collections::{BTreeMap, HashSet};

use crate::document::{Scalar, Value};
use crate::error::{CompileError, CompileResult};

use super::iri::{AbbreviationTable, Resolver};
use super::{Iri, Triple};

/// Reserved key naming a nested mapping's identifier.
pub const ID_KEY: &str = "id";

/// Local name of the root subject of every description.
pub const ROOT_NAME: &str = "ROOT";

/// Anonymous identifier counter for one compilation run.
///
/// Every document loaded into the same store within one run must share a
/// counter, otherwise anonymous identifiers of different documents collide.
/// Explicit identifiers registered with [`AnonIds::reserve`] are skipped, so
/// `id: 3` and an anonymous node never both become `<base>/3`.
#[derive(Debug, Default)]
pub struct AnonIds {
    issued: u64,
    reserved: HashSet<Iri>,
}

impl AnonIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next anonymous identifier under the resolver's base. Starts at 1.
    pub fn next(&mut self, resolver: &Resolver<'_>) -> Iri {
        loop {
            self.issued += 1;
            let iri = resolver.anonymous(self.issued);
            if !self.reserved.contains(&iri) {
                return iri;
            }
        }
    }

    /// Keep `iri` out of the anonymous range.
    pub fn reserve(&mut self, iri: Iri) {
        self.reserved.insert(iri);
    }

    /// Highest counter value drawn so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

/// Compiles documents that share one base URI.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'a> {
    resolver: Resolver<'a>,
}

impl<'a> Compiler<'a> {
    pub fn new(table: &'a AbbreviationTable, base: &'a str) -> Self {
        Self {
            resolver: Resolver::new(table, base),
        }
    }

    /// Compiler for a description file, using the base URI its path matches.
    pub fn for_file(table: &'a AbbreviationTable, file: &str) -> CompileResult<Self> {
        let base = table.base_for(file)?;
        Ok(Self::new(table, base))
    }

    /// The default root subject, `<base>/ROOT`.
    pub fn root(&self) -> Iri {
        let base = self.resolver.base().trim_end_matches('/');
        Iri::new(format!("{base}/{ROOT_NAME}"))
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    /// Reserve the explicit `id` of every nested mapping in `doc`.
    ///
    /// [`Compiler::compile`] does this for its own document; call it directly
    /// to reserve the ids of documents that are compiled later in the run.
    /// Ids that do not resolve are left for `compile` to report.
    pub fn reserve(&self, doc: &Value, ids: &mut AnonIds) {
        if let Value::Mapping(map) = doc {
            self.reserve_children(map, ids);
        }
    }

    fn reserve_children(&self, map: &BTreeMap<String, Value>, ids: &mut AnonIds) {
        for value in map.values() {
            match value {
                Value::Mapping(node) => self.reserve_node(node, ids),
                Value::Sequence(items) => {
                    for item in items {
                        if let Value::Mapping(node) = item {
                            self.reserve_node(node, ids);
                        }
                    }
                }
                Value::Scalar(_) => {}
            }
        }
    }

    fn reserve_node(&self, node: &BTreeMap<String, Value>, ids: &mut AnonIds) {
        if let Some(Value::Scalar(scalar)) = node.get(ID_KEY) {
            if let Some(raw) = scalar.canonical() {
                if let Ok(iri) = self.resolver.identifier(&raw, ID_KEY) {
                    ids.reserve(iri);
                }
            }
        }
        self.reserve_children(node, ids);
    }

    /// Compile `doc` with `root` as the subject of its top-level keys.
    pub fn compile(
        &self,
        doc: &Value,
        root: &Iri,
        ids: &mut AnonIds,
    ) -> CompileResult<Vec<Triple>> {
        self.reserve(doc, ids);
        let map = match doc {
            Value::Mapping(map) => map,
            other => {
                return Err(CompileError::UnparseablePairing {
                    path: "$".into(),
                    found: other.kind(),
                });
            }
        };

        let mut out = Vec::new();
        self.mapping(map, root, "$", false, ids, &mut out)?;
        tracing::debug!(
            base = self.resolver.base(),
            triples = out.len(),
            anonymous = ids.issued(),
            "compiled document"
        );
        Ok(out)
    }

    fn mapping(
        &self,
        map: &BTreeMap<String, Value>,
        subject: &Iri,
        path: &str,
        linked: bool,
        ids: &mut AnonIds,
        out: &mut Vec<Triple>,
    ) -> CompileResult<()> {
        for (key, value) in map {
            if linked && key == ID_KEY {
                continue;
            }
            let path = format!("{path}.{key}");
            let predicate = self.resolver.identifier(key, &path)?;
            self.value(subject, &predicate, value, &path, ids, out)?;
        }
        Ok(())
    }

    fn value(
        &self,
        subject: &Iri,
        predicate: &Iri,
        value: &Value,
        path: &str,
        ids: &mut AnonIds,
        out: &mut Vec<Triple>,
    ) -> CompileResult<()> {
        match value {
            Value::Mapping(map) => {
                let node = self.node_id(map, path, ids)?;
                out.push(Triple::new(subject.clone(), predicate.clone(), node.clone()));
                self.mapping(map, &node, path, true, ids, out)
            }
            Value::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    let path = format!("{path}[{i}]");
                    if let Value::Sequence(_) = item {
                        return Err(CompileError::UnsupportedShape { path });
                    }
                    self.value(subject, predicate, item, &path, ids, out)?;
                }
                Ok(())
            }
            Value::Scalar(scalar) => {
                if let Some(object) = self.resolver.object(scalar, path)? {
                    out.push(Triple::new(subject.clone(), predicate.clone(), object));
                }
                Ok(())
            }
        }
    }

    fn node_id(
        &self,
        map: &BTreeMap<String, Value>,
        path: &str,
        ids: &mut AnonIds,
    ) -> CompileResult<Iri> {
        let id_path = format!("{path}.{ID_KEY}");
        match map.get(ID_KEY) {
            None | Some(Value::Scalar(Scalar::Null)) => Ok(ids.next(&self.resolver)),
            Some(Value::Scalar(scalar)) => {
                let raw = scalar.canonical().unwrap_or_default();
                self.resolver.identifier(&raw, &id_path)
            }
            Some(other) => Err(CompileError::TypeMismatch {
                path: id_path,
                expected: "scalar identifier",
                found: other.kind(),
            }),
        }
    }
}
