//! Bulk insertion of compiled facts.

use std::fmt::Write as _;

use super::Triple;
use super::iri::AbbreviationTable;

/// Render `triples` as a single `INSERT DATA` update.
///
/// Every table prefix is declared up front (sorted by abbreviation) so the
/// update stays readable when logged. Objects are always written in full, so
/// the declarations are informational only.
pub fn insert_data(triples: &[Triple], table: &AbbreviationTable) -> String {
    let mut prefixes: Vec<(&str, &str)> = table.prefixes().collect();
    prefixes.sort_unstable();
    prefixes.dedup_by(|a, b| a.0 == b.0);

    let mut out = String::new();
    for (abbreviation, uri) in prefixes {
        let uri = uri.trim_end_matches('/');
        let _ = writeln!(out, "PREFIX {abbreviation}: <{uri}/>");
    }
    out.push_str("INSERT DATA {\n");
    for triple in triples {
        let _ = writeln!(out, "    {triple}");
    }
    out.push('}');
    out
}
