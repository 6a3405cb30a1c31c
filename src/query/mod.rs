//! Query execution seams.
//!
//! Two layers:
//!
//! - [`SparqlBackend`] runs query *text* against a graph store. Implemented by
//!   the HTTP client ([`http::SparqlEndpoint`]) and the in-process store
//!   ([`store::SparqlStore`]).
//! - [`QueryExecutor`] runs a query *reference* (a path relative to the
//!   configuration roots). [`QueryFiles`] bridges the two.
//!
//! The tree evaluator and the analysis cycle only depend on these traits.

pub mod http;
pub mod store;

use std::collections::BTreeMap;

use crate::error::{QueryError, QueryResult};
use crate::graph::Triple;
use crate::graph::insert::insert_data;
use crate::graph::iri::AbbreviationTable;
use crate::paths::ConfigRoots;

/// One result row: variable name → flattened scalar value.
pub type Binding = BTreeMap<String, String>;

/// Update that removes every fact from the default graph.
pub const CLEAR_ALL: &str = "DELETE { ?s ?p ?o } WHERE { ?s ?p ?o }";

/// Runs a query by reference.
///
/// An empty row list is a valid outcome meaning "condition not observed";
/// failures are always reported as errors.
pub trait QueryExecutor {
    fn execute(&self, reference: &str) -> QueryResult<Vec<Binding>>;
}

/// A SPARQL-speaking graph store.
pub trait SparqlBackend {
    /// Run a SELECT (or ASK) query.
    fn select(&self, query: &str) -> QueryResult<Vec<Binding>>;

    /// Run an update.
    fn update(&self, update: &str) -> QueryResult<()>;

    /// Delete every fact.
    fn clear(&self) -> QueryResult<()> {
        tracing::debug!("clearing graph store");
        self.update(CLEAR_ALL)
    }

    /// Bulk-insert compiled facts.
    fn insert(&self, triples: &[Triple], table: &AbbreviationTable) -> QueryResult<()> {
        tracing::debug!(triples = triples.len(), "inserting facts");
        self.update(&insert_data(triples, table))
    }
}

/// Resolves query references against the configuration roots and runs them on
/// a backend.
pub struct QueryFiles<'a, B: SparqlBackend + ?Sized> {
    roots: &'a ConfigRoots,
    backend: &'a B,
}

impl<'a, B: SparqlBackend + ?Sized> QueryFiles<'a, B> {
    pub fn new(roots: &'a ConfigRoots, backend: &'a B) -> Self {
        Self { roots, backend }
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    /// Read the text of a referenced query file.
    pub fn read(&self, reference: &str) -> QueryResult<String> {
        let path = self
            .roots
            .file(reference)
            .map_err(|_| QueryError::Unresolved {
                reference: reference.to_string(),
            })?;
        std::fs::read_to_string(&path).map_err(|source| QueryError::Read {
            path: path.display().to_string(),
            source,
        })
    }

    /// Run a referenced update file (reasoner rules).
    pub fn run_update_file(&self, reference: &str) -> QueryResult<()> {
        let text = self.read(reference)?;
        tracing::debug!(reference, "running update");
        self.backend.update(&text)
    }
}

impl<B: SparqlBackend + ?Sized> QueryExecutor for QueryFiles<'_, B> {
    fn execute(&self, reference: &str) -> QueryResult<Vec<Binding>> {
        let text = self.read(reference)?;
        let rows = self.backend.select(&text)?;
        tracing::debug!(reference, rows = rows.len(), "query executed");
        Ok(rows)
    }
}
