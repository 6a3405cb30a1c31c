//! In-process SPARQL store backed by oxigraph.
//!
//! Used for offline analysis (`--in-memory`) and as the query engine in tests.

use oxigraph::model::Term;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::{QueryError, QueryResult};

use super::{Binding, SparqlBackend};

/// In-memory SPARQL-capable RDF store.
pub struct SparqlStore {
    store: Store,
}

impl SparqlStore {
    /// Create an empty in-memory store.
    pub fn in_memory() -> QueryResult<Self> {
        let store = Store::new().map_err(|e| QueryError::Store {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self { store })
    }

    /// Number of facts in the default graph.
    pub fn len(&self) -> QueryResult<usize> {
        self.store.len().map_err(|e| QueryError::Store {
            message: format!("failed to count facts: {e}"),
        })
    }

    pub fn is_empty(&self) -> QueryResult<bool> {
        self.len().map(|n| n == 0)
    }
}

/// Flatten a bound term to its scalar representation.
fn flatten(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_string(),
        Term::BlankNode(node) => node.as_str().to_string(),
        Term::Literal(literal) => literal.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

impl SparqlBackend for SparqlStore {
    fn select(&self, query: &str) -> QueryResult<Vec<Binding>> {
        let results = self.store.query(query).map_err(|e| QueryError::Store {
            message: format!("SPARQL query failed: {e}"),
        })?;

        match results {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| QueryError::Store {
                        message: format!("solution error: {e}"),
                    })?;
                    let row: Binding = solution
                        .iter()
                        .map(|(var, term)| (var.as_str().to_string(), flatten(term)))
                        .collect();
                    rows.push(row);
                }
                Ok(rows)
            }
            QueryResults::Boolean(b) => {
                Ok(vec![Binding::from([("result".to_string(), b.to_string())])])
            }
            QueryResults::Graph(_) => Err(QueryError::Store {
                message: "CONSTRUCT/DESCRIBE queries are not supported".into(),
            }),
        }
    }

    fn update(&self, update: &str) -> QueryResult<()> {
        self.store.update(update).map_err(|e| QueryError::Store {
            message: format!("SPARQL update failed: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::iri::AbbreviationTable;
    use crate::graph::{Iri, Literal, Triple};

    fn facts() -> Vec<Triple> {
        vec![
            Triple::new(
                Iri::new("https://example.com/ROOT"),
                Iri::new("https://example.com/name"),
                Literal::String("shop".into()),
            ),
            Triple::new(
                Iri::new("https://example.com/ROOT"),
                Iri::new("https://example.com/port"),
                Literal::Integer(443),
            ),
            Triple::new(
                Iri::new("https://example.com/ROOT"),
                Iri::new("https://example.com/db"),
                Iri::new("https://example.com/db1"),
            ),
        ]
    }

    #[test]
    fn inserted_facts_are_queryable_as_flat_values() {
        let store = SparqlStore::in_memory().unwrap();
        store.insert(&facts(), &AbbreviationTable::new()).unwrap();
        assert_eq!(store.len().unwrap(), 3);

        let rows = store
            .select(
                "SELECT ?n ?p ?db WHERE { \
                 ?s <https://example.com/name> ?n ; \
                    <https://example.com/port> ?p ; \
                    <https://example.com/db> ?db }",
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], "shop");
        assert_eq!(rows[0]["p"], "443");
        assert_eq!(rows[0]["db"], "https://example.com/db1");
    }

    #[test]
    fn clear_empties_the_store() {
        let store = SparqlStore::in_memory().unwrap();
        store.insert(&facts(), &AbbreviationTable::new()).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn prefixed_insert_parses() {
        let table = AbbreviationTable::new()
            .with_entry("ex", "https://example.com", &[])
            .unwrap();
        let store = SparqlStore::in_memory().unwrap();
        store.insert(&facts(), &table).unwrap();
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn syntax_errors_are_store_errors() {
        let store = SparqlStore::in_memory().unwrap();
        assert!(matches!(store.select("SELEC nothing"), Err(QueryError::Store { .. })));
        assert!(matches!(store.update("INSERT garbage"), Err(QueryError::Store { .. })));
    }

    #[test]
    fn ask_returns_one_row() {
        let store = SparqlStore::in_memory().unwrap();
        let rows = store.select("ASK { ?s ?p ?o }").unwrap();
        assert_eq!(rows[0]["result"], "false");
    }
}
