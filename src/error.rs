//! Rich diagnostic error types for devprivops.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly which
//! document key, tree node, or query caused a failure.

use std::borrow::Borrow;

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::paths::PathError;

/// Top-level error type for devprivops.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum PrivopsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Analysis(#[from] AnalysisError),
}

// ---------------------------------------------------------------------------
// Document errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    #[error("failed to read document: {path}")]
    #[diagnostic(
        code(devprivops::document::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {message}")]
    #[diagnostic(
        code(devprivops::document::yaml),
        help("Fix the YAML syntax. JSON documents are accepted as well.")
    )]
    Yaml { path: String, message: String },

    #[error("unexpected value at `{path}`: expected {expected}, found {found}")]
    #[diagnostic(
        code(devprivops::document::type_mismatch),
        help(
            "Documents may only contain mappings, sequences, strings, integers, \
             booleans and nulls. Quote the value if it is meant as text."
        )
    )]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

// ---------------------------------------------------------------------------
// Compile errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("unregistered prefix \"{prefix}\" at `{path}`")]
    #[diagnostic(
        code(devprivops::compile::unresolved_prefix),
        help(
            "Add an entry with `abreviation: {prefix}` to uris.yml, \
             or quote the value differently if it is not meant as a reference."
        )
    )]
    UnresolvedPrefix { prefix: String, path: String },

    #[error("no base URI configured for \"{file}\"")]
    #[diagnostic(
        code(devprivops::compile::no_base_uri),
        help("Add a `files` pattern matching this path to one of the entries in uris.yml.")
    )]
    NoBaseUri { file: String },

    #[error("\"{file}\" matches more than one base URI: {candidates}")]
    #[diagnostic(
        code(devprivops::compile::ambiguous_base_uri),
        help("Exactly one uris.yml entry may claim a file. Narrow the `files` patterns.")
    )]
    AmbiguousBaseUri { file: String, candidates: String },

    #[error("empty identifier at `{path}`")]
    #[diagnostic(
        code(devprivops::compile::empty_identifier),
        help("Subjects, predicates and `id` values must not be empty.")
    )]
    EmptyIdentifier { path: String },

    #[error("sequence of sequences at `{path}` is not supported")]
    #[diagnostic(
        code(devprivops::compile::unsupported_shape),
        help("Wrap the inner sequence in a mapping with its own key.")
    )]
    UnsupportedShape { path: String },

    #[error("unexpected value at `{path}`: expected {expected}, found {found}")]
    #[diagnostic(
        code(devprivops::compile::type_mismatch),
        help("`id` values must be scalars.")
    )]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("cannot pair a {found} at `{path}` with a subject")]
    #[diagnostic(
        code(devprivops::compile::unparseable_pairing),
        help("The top level of a description must be a mapping of keys to values.")
    )]
    UnparseablePairing { path: String, found: &'static str },
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;

// ---------------------------------------------------------------------------
// Attack tree errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TreeError {
    #[error("attack tree node at `{path}` is missing required field \"{field}\"")]
    #[diagnostic(
        code(devprivops::tree::missing_field),
        help("Every node needs `description`, `query` and `children` (use `[]` for leaves).")
    )]
    MissingField { field: &'static str, path: String },

    #[error("attack tree field `{path}` has the wrong type: expected {expected}, found {found}")]
    #[diagnostic(
        code(devprivops::tree::type_mismatch),
        help("`description` and `query` are strings, `children` is a list of nodes.")
    )]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] DocumentError),
}

pub type TreeResult<T> = std::result::Result<T, TreeError>;

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("query \"{reference}\" not found in the local or global directory")]
    #[diagnostic(
        code(devprivops::query::unresolved),
        help("Query references are relative to the configuration roots, e.g. `attack_trees/queries/x.rq`.")
    )]
    Unresolved { reference: String },

    #[error("failed to read query file: {path}")]
    #[diagnostic(code(devprivops::query::read), help("Check file permissions."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SPARQL endpoint request failed: {message}")]
    #[diagnostic(
        code(devprivops::query::transport),
        help("Is the triple store running and reachable at the configured host and port?")
    )]
    Transport { message: String },

    #[error("SPARQL endpoint answered {status}: {body}")]
    #[diagnostic(
        code(devprivops::query::status),
        help("A 400 usually means a syntax error in the query; 401/403 means bad credentials.")
    )]
    Status { status: u16, body: String },

    #[error("malformed SPARQL results: {message}")]
    #[diagnostic(
        code(devprivops::query::malformed),
        help("Only SELECT queries returning `application/sparql-results+json` are supported.")
    )]
    MalformedResponse { message: String },

    #[error("graph store error: {message}")]
    #[diagnostic(
        code(devprivops::query::store),
        help("The in-process store rejected the query. Check the query syntax.")
    )]
    Store { message: String },
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

// ---------------------------------------------------------------------------
// Analysis errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AnalysisError {
    #[error("\"{file}\" does not abide by its schema: {}", .violations.join("; "))]
    #[diagnostic(
        code(devprivops::analysis::schema),
        help("Fix the listed violations in the description.")
    )]
    SchemaViolation { file: String, violations: Vec<String> },

    #[error("invalid {kind} file \"{file}\": {message}")]
    #[diagnostic(
        code(devprivops::analysis::manifest),
        help("Compare the file against the documented layout of {kind} files.")
    )]
    Manifest {
        kind: &'static str,
        file: String,
        message: String,
    },

    #[error("failed to write report {path}: {message}")]
    #[diagnostic(
        code(devprivops::analysis::write),
        help("Check that the output directory exists and is writable.")
    )]
    Write { path: String, message: String },

    #[error("failed to send report to {url}: {message}")]
    #[diagnostic(
        code(devprivops::analysis::send),
        help("Check that the report endpoint is running and accepts JSON POST requests.")
    )]
    Send { url: String, message: String },

    #[error("{stage} failed for \"{file}\"")]
    #[diagnostic(code(devprivops::analysis::stage))]
    Stage {
        stage: &'static str,
        file: String,
        #[source]
        #[diagnostic_source]
        source: Box<PrivopsError>,
    },
}

// miette reaches a `#[diagnostic_source]` field through `Borrow<dyn Diagnostic>`.
impl<'a> Borrow<dyn Diagnostic + 'a> for Box<PrivopsError> {
    fn borrow(&self) -> &(dyn Diagnostic + 'a) {
        &**self
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

/// Convenience alias for functions returning devprivops results.
pub type PrivopsResult<T> = std::result::Result<T, PrivopsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_converts_to_top_level() {
        let err = CompileError::UnsupportedShape {
            path: "a[0]".into(),
        };
        let top: PrivopsError = err.into();
        assert!(matches!(
            top,
            PrivopsError::Compile(CompileError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn tree_error_wraps_document_error() {
        let doc = DocumentError::Yaml {
            path: "t.yml".into(),
            message: "bad indent".into(),
        };
        let tree: TreeError = doc.into();
        assert!(matches!(tree, TreeError::Document(DocumentError::Yaml { .. })));
    }

    #[test]
    fn error_display_names_offending_key() {
        let err = CompileError::UnresolvedPrefix {
            prefix: "ot".into(),
            path: "flows[1].to".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("\"ot\""));
        assert!(msg.contains("flows[1].to"));
    }

    #[test]
    fn stage_error_exposes_the_inner_diagnostic() {
        let inner: PrivopsError = CompileError::NoBaseUri {
            file: "descriptions/x.yml".into(),
        }
        .into();
        let err = AnalysisError::Stage {
            stage: "compile",
            file: "descriptions/x.yml".into(),
            source: Box::new(inner),
        };

        let cause = err.diagnostic_source().expect("inner diagnostic");
        assert_eq!(
            cause.code().map(|c| c.to_string()).as_deref(),
            Some("devprivops::compile::no_base_uri")
        );
        assert!(cause.help().is_some());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn schema_violation_lists_every_violation() {
        let err = AnalysisError::SchemaViolation {
            file: "descriptions/dfd.yml".into(),
            violations: vec!["a is required".into(), "b must be a string".into()],
        };
        assert_eq!(
            err.to_string(),
            "\"descriptions/dfd.yml\" does not abide by its schema: a is required; b must be a string"
        );
    }
}
