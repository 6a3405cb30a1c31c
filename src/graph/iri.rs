//! Identifier resolution.
//!
//! Description files refer to entities with short forms that are expanded
//! against an [`AbbreviationTable`] (loaded from `uris.yml`):
//!
//! | Written as        | Resolves to                    |
//! |-------------------|--------------------------------|
//! | `<https://x/y>`   | `https://x/y` (as is)          |
//! | `https://x/y`     | `https://x/y` (as is)          |
//! | `:local`          | `<document base>/local`        |
//! | `prefix:local`    | `<table[prefix]>/local`        |
//! | `local`           | `<document base>/local`        |
//!
//! In object position the last row is a string literal instead.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::config::{ConfigError, ConfigResult};
use crate::document::Scalar;
use crate::error::{CompileError, CompileResult};

use super::{Iri, Literal, Term};

/// One `uris.yml` entry.
#[derive(Debug, Clone)]
pub struct UriEntry {
    /// Short prefix, e.g. `ex`.
    pub abbreviation: String,
    /// Base URI the prefix expands to.
    pub uri: String,
    /// Patterns of source files whose entities default to this base.
    pub files: Vec<Regex>,
}

#[derive(Debug, Deserialize)]
struct RawUriEntry {
    #[serde(alias = "abreviation")]
    abbreviation: String,
    uri: String,
    #[serde(default)]
    files: Vec<String>,
}

/// Prefix → base URI mappings plus per-file default bases.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationTable {
    entries: Vec<UriEntry>,
}

impl AbbreviationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. `files` are regular expressions matched against the
    /// description path relative to the configuration root.
    pub fn with_entry(
        mut self,
        abbreviation: &str,
        uri: &str,
        files: &[&str],
    ) -> ConfigResult<Self> {
        let files = files
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<ConfigResult<Vec<_>>>()?;
        self.entries.push(UriEntry {
            abbreviation: abbreviation.to_string(),
            uri: uri.to_string(),
            files,
        });
        Ok(self)
    }

    /// Parse a `uris.yml` document: a list of `{abreviation, uri, files}`.
    pub fn from_yaml_str(text: &str, origin: &str) -> ConfigResult<Self> {
        let raw: Vec<RawUriEntry> =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
                path: origin.to_string(),
                message: e.to_string(),
            })?;

        let mut table = Self::new();
        for entry in raw {
            let patterns: Vec<&str> = entry.files.iter().map(String::as_str).collect();
            table = table.with_entry(&entry.abbreviation, &entry.uri, &patterns)?;
        }
        Ok(table)
    }

    /// Read a `uris.yml` file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    /// Base URI registered for `prefix`.
    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.abbreviation == prefix)
            .map(|e| e.uri.as_str())
    }

    /// The single base URI whose file patterns match `file`.
    pub fn base_for(&self, file: &str) -> CompileResult<&str> {
        let matching: Vec<&UriEntry> = self
            .entries
            .iter()
            .filter(|e| e.files.iter().any(|re| re.is_match(file)))
            .collect();

        match matching.as_slice() {
            [] => Err(CompileError::NoBaseUri {
                file: file.to_string(),
            }),
            [entry] => Ok(entry.uri.as_str()),
            many => Err(CompileError::AmbiguousBaseUri {
                file: file.to_string(),
                candidates: many
                    .iter()
                    .map(|e| e.abbreviation.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// `(abbreviation, uri)` pairs in declaration order.
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.abbreviation.as_str(), e.uri.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn compile_pattern(pattern: &str) -> ConfigResult<Regex> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Syntactic shape of a raw reference.
#[derive(Debug, PartialEq, Eq)]
enum Shape<'s> {
    Bracketed(&'s str),
    Absolute(&'s str),
    RootRelative(&'s str),
    Prefixed(&'s str, &'s str),
    Plain(&'s str),
}

fn classify(raw: &str) -> Shape<'_> {
    if raw.len() >= 2 && raw.starts_with('<') && raw.ends_with('>') {
        return Shape::Bracketed(&raw[1..raw.len() - 1]);
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Shape::Absolute(raw);
    }
    if let Some(local) = raw.strip_prefix(':') {
        return Shape::RootRelative(local);
    }
    if let Some((prefix, local)) = raw.split_once(':') {
        if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            return Shape::Prefixed(prefix, local);
        }
    }
    Shape::Plain(raw)
}

fn join(base: &str, local: &str) -> Iri {
    Iri::new(format!("{}/{}", base.trim_end_matches('/'), local))
}

/// Resolves references in one document against its base URI.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    table: &'a AbbreviationTable,
    base: &'a str,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a AbbreviationTable, base: &'a str) -> Self {
        Self { table, base }
    }

    /// The document's own base URI.
    pub fn base(&self) -> &'a str {
        self.base
    }

    /// Resolve a subject, predicate, or explicit `id` value. `path` locates the
    /// value in the document for error messages.
    pub fn identifier(&self, raw: &str, path: &str) -> CompileResult<Iri> {
        match classify(raw) {
            Shape::Bracketed(iri) | Shape::Absolute(iri) => Ok(Iri::new(non_empty(iri, path)?)),
            Shape::RootRelative(local) | Shape::Plain(local) => {
                Ok(join(self.base, non_empty(local, path)?))
            }
            Shape::Prefixed(prefix, local) => self.prefixed(prefix, local, path),
        }
    }

    /// Resolve an object value. Identifier-shaped strings become IRIs, anything
    /// else a literal. Returns `None` for null.
    pub fn object(&self, value: &Scalar, path: &str) -> CompileResult<Option<Term>> {
        let term = match value {
            Scalar::Null => return Ok(None),
            Scalar::Int(i) => Literal::Integer(*i).into(),
            Scalar::Bool(b) => Literal::Boolean(*b).into(),
            Scalar::String(s) => match classify(s) {
                Shape::Plain(_) => Literal::String(s.clone()).into(),
                Shape::Bracketed(iri) | Shape::Absolute(iri) => Iri::new(non_empty(iri, path)?).into(),
                Shape::RootRelative(local) => join(self.base, non_empty(local, path)?).into(),
                Shape::Prefixed(prefix, local) => self.prefixed(prefix, local, path)?.into(),
            },
        };
        Ok(Some(term))
    }

    /// Anonymous identifier `<base>/<n>`.
    pub fn anonymous(&self, n: u64) -> Iri {
        join(self.base, &n.to_string())
    }

    fn prefixed(&self, prefix: &str, local: &str, path: &str) -> CompileResult<Iri> {
        let uri = self
            .table
            .lookup(prefix)
            .ok_or_else(|| CompileError::UnresolvedPrefix {
                prefix: prefix.to_string(),
                path: path.to_string(),
            })?;
        Ok(join(uri, non_empty(local, path)?))
    }
}

/// The local part (or full IRI) of a reference, which must not be blank.
fn non_empty<'s>(text: &'s str, path: &str) -> CompileResult<&'s str> {
    if text.trim().is_empty() {
        return Err(CompileError::EmptyIdentifier {
            path: path.to_string(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AbbreviationTable {
        AbbreviationTable::new()
            .with_entry("ex", "https://example.com", &[r"^descriptions/dfd\.yml$"])
            .unwrap()
            .with_entry("ot", "http://another.org/", &[r"^descriptions/other"])
            .unwrap()
    }

    fn iri(s: &str) -> Term {
        Term::Iri(Iri::new(s))
    }

    #[test]
    fn classify_shapes() {
        assert_eq!(classify("<a b>"), Shape::Bracketed("a b"));
        assert_eq!(classify("https://x.org/a"), Shape::Absolute("https://x.org/a"));
        assert_eq!(classify(":a"), Shape::RootRelative("a"));
        assert_eq!(classify("ot:a"), Shape::Prefixed("ot", "a"));
        assert_eq!(classify("v2:a"), Shape::Plain("v2:a"));
        assert_eq!(classify("plain text"), Shape::Plain("plain text"));
    }

    #[test]
    fn identifiers_resolve_against_base_and_prefixes() {
        let table = table();
        let r = Resolver::new(&table, "https://example.com");
        assert_eq!(r.identifier("aId", "$").unwrap().as_str(), "https://example.com/aId");
        assert_eq!(r.identifier(":b", "$").unwrap().as_str(), "https://example.com/b");
        assert_eq!(r.identifier("ot:a", "$").unwrap().as_str(), "http://another.org/a");
        assert_eq!(
            r.identifier("<http://example.com/ex1>", "$").unwrap().as_str(),
            "http://example.com/ex1"
        );
        assert_eq!(
            r.identifier("ot:data subject", "$").unwrap().as_str(),
            "http://another.org/data_subject"
        );
    }

    #[test]
    fn empty_identifier_is_an_error() {
        let table = table();
        let r = Resolver::new(&table, "https://example.com");
        let err = r.identifier("  ", "$.a.id").unwrap_err();
        assert!(matches!(err, CompileError::EmptyIdentifier { ref path } if path == "$.a.id"));
    }

    #[test]
    fn references_with_nothing_after_the_marker_are_empty() {
        let table = table();
        let r = Resolver::new(&table, "https://example.com");
        for raw in ["<>", "< >", ":", "ot:"] {
            assert!(
                matches!(r.identifier(raw, "$.k"), Err(CompileError::EmptyIdentifier { .. })),
                "{raw:?} should be rejected"
            );
        }
        for raw in ["<>", ":", "ot:"] {
            let err = r.object(&Scalar::String(raw.into()), "$.k").unwrap_err();
            assert!(matches!(err, CompileError::EmptyIdentifier { .. }), "{raw:?}");
        }
    }

    #[test]
    fn objects_distinguish_literals_from_references() {
        let table = table();
        let r = Resolver::new(&table, "https://example.com");
        assert_eq!(
            r.object(&Scalar::String("http://example.com/ex3".into()), "$").unwrap(),
            Some(iri("http://example.com/ex3"))
        );
        assert_eq!(
            r.object(&Scalar::String(":b".into()), "$").unwrap(),
            Some(iri("https://example.com/b"))
        );
        assert_eq!(
            r.object(&Scalar::String("some value".into()), "$").unwrap(),
            Some(Term::Literal(Literal::String("some value".into())))
        );
        assert_eq!(
            r.object(&Scalar::Int(6), "$").unwrap(),
            Some(Term::Literal(Literal::Integer(6)))
        );
        assert_eq!(
            r.object(&Scalar::Bool(true), "$").unwrap(),
            Some(Term::Literal(Literal::Boolean(true)))
        );
        assert_eq!(r.object(&Scalar::Null, "$").unwrap(), None);
    }

    #[test]
    fn unregistered_object_prefix_is_an_error() {
        let table = table();
        let r = Resolver::new(&table, "https://example.com");
        let err = r
            .object(&Scalar::String("zz:thing".into()), "$.flow.to")
            .unwrap_err();
        match err {
            CompileError::UnresolvedPrefix { prefix, path } => {
                assert_eq!(prefix, "zz");
                assert_eq!(path, "$.flow.to");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn base_for_requires_exactly_one_match() {
        let table = table();
        assert_eq!(table.base_for("descriptions/dfd.yml").unwrap(), "https://example.com");
        assert!(matches!(
            table.base_for("descriptions/unknown.yml"),
            Err(CompileError::NoBaseUri { .. })
        ));

        let ambiguous = table
            .with_entry("dup", "https://dup.org", &[r"dfd"])
            .unwrap();
        assert!(matches!(
            ambiguous.base_for("descriptions/dfd.yml"),
            Err(CompileError::AmbiguousBaseUri { .. })
        ));
    }

    #[test]
    fn loads_uris_yaml_with_original_spelling() {
        let table = AbbreviationTable::from_yaml_str(
            "- abreviation: ex\n  uri: https://example.com\n  files: ['^descriptions/']\n\
             - abbreviation: cfg\n  uri: https://devprivops.com/config\n",
            "uris.yml",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("cfg"), Some("https://devprivops.com/config"));
        assert_eq!(table.base_for("descriptions/x.yml").unwrap(), "https://example.com");
    }

    #[test]
    fn invalid_file_pattern_is_a_config_error() {
        let err = AbbreviationTable::new()
            .with_entry("ex", "https://example.com", &["(unclosed"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
