//! JSON Schema validation of description files.
//!
//! A description named `<name>.<kind>.yml` is checked against
//! `schemas/<kind>-schema.json` from the configuration roots. Files without a
//! kind, or whose kind has no schema, are accepted as they are.

use crate::document::Value;
use crate::error::{AnalysisError, PrivopsResult};
use crate::paths::ConfigRoots;

use super::DocumentValidator;

/// Validates descriptions with the schemas found under `schemas/`.
pub struct JsonSchemaValidator<'a> {
    roots: &'a ConfigRoots,
}

impl<'a> JsonSchemaValidator<'a> {
    pub fn new(roots: &'a ConfigRoots) -> Self {
        Self { roots }
    }
}

/// Schema reference for a description file, e.g. `descriptions/shop.dfd.yml`
/// → `schemas/dfd-schema.json`.
pub fn schema_for(file: &str) -> Option<String> {
    let name = file.rsplit('/').next()?;
    let mut parts = name.rsplit('.');
    let _extension = parts.next()?;
    let kind = parts.next()?;
    parts.next()?;
    Some(format!("schemas/{kind}-schema.json"))
}

impl DocumentValidator for JsonSchemaValidator<'_> {
    fn validate(&self, file: &str, doc: &Value) -> PrivopsResult<Vec<String>> {
        let Some(schema_ref) = schema_for(file) else {
            return Ok(Vec::new());
        };
        let Some(schema_path) = self.roots.optional_file(&schema_ref) else {
            tracing::debug!(file, schema = %schema_ref, "no schema, skipping validation");
            return Ok(Vec::new());
        };

        let manifest = |message: String| AnalysisError::Manifest {
            kind: "schema",
            file: schema_ref.clone(),
            message,
        };
        let text = std::fs::read_to_string(&schema_path).map_err(|e| manifest(e.to_string()))?;
        let schema: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| manifest(e.to_string()))?;
        let validator = jsonschema::validator_for(&schema).map_err(|e| manifest(e.to_string()))?;

        let instance = doc.to_json();
        let violations: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        tracing::debug!(file, schema = %schema_ref, violations = violations.len(), "validated");
        Ok(violations)
    }
}
