// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # devprivops
//!
//! Privacy and threat analysis of declarative system descriptions.
//!
//! ## Architecture
//!
//! - **Documents** (`document`): YAML/JSON parsed once into a tagged value tree
//! - **Graph compiler** (`graph`): description documents → subject/predicate/object facts
//! - **Attack trees** (`attack_tree`): OR-gated condition trees evaluated over query results
//! - **Query plumbing** (`query`): SPARQL endpoint over HTTP or an in-process oxigraph store
//! - **Analysis** (`analysis`): load, reason, check policies, trees and requirements, report
//!
//! ## Library usage
//!
//! ```
//! use devprivops::document::Value;
//! use devprivops::graph::compile::{AnonIds, Compiler};
//! use devprivops::graph::iri::AbbreviationTable;
//!
//! let table = AbbreviationTable::new()
//!     .with_entry("ex", "https://example.com", &["^descriptions/"])
//!     .unwrap();
//! let doc = Value::from_yaml_str("shop:\n  id: shop1\n  port: 443\n", "dfd.yml").unwrap();
//! let compiler = Compiler::for_file(&table, "descriptions/dfd.yml").unwrap();
//! let facts = compiler.compile(&doc, &compiler.root(), &mut AnonIds::new()).unwrap();
//! assert_eq!(facts.len(), 2);
//! ```

pub mod analysis;
pub mod attack_tree;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod paths;
pub mod query;
