//! Regression scenarios for the reasoner and queries.
//!
//! `tests/spec.json` lists scenarios. Each one names a directory of
//! descriptions (`stateDir`) and the rows every query must return once those
//! descriptions are loaded, `config/config.yml` is applied and the reasoner
//! rules have run:
//!
//! ```json
//! [{"stateDir": "tests/leaky", "tests": [
//!     {"query": "tests/queries/leak.rq", "expectedResult": [{"e": "https://example.com/tracker"}]}
//! ]}]
//! ```
//!
//! A mismatch is recorded and the remaining tests still run. Errors reading
//! or loading files abort the suite.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, PrivopsResult};
use crate::graph::compile::AnonIds;
use crate::paths::ConfigRoots;
use crate::query::{QueryExecutor, SparqlBackend};

use super::{Analyzer, rows_to_json, stage};

/// Scenario list, relative to the configuration roots.
pub const SUITE_FILE: &str = "tests/spec.json";

/// Configuration applied to every scenario when present.
pub const SCENARIO_CONFIG: &str = "config/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(rename = "stateDir")]
    pub state_dir: String,
    pub tests: Vec<ScenarioTest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioTest {
    /// Query reference.
    pub query: String,
    #[serde(rename = "expectedResult")]
    pub expected_result: serde_json::Value,
}

/// A query whose rows differ from the expected ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestFailure {
    pub query: String,
    pub expected: serde_json::Value,
    pub actual: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    #[serde(rename = "stateDir")]
    pub state_dir: String,
    /// Number of tests run.
    pub tests: usize,
    pub failures: Vec<TestFailure>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Load the scenario list from the roots.
pub fn read_suite(roots: &ConfigRoots) -> PrivopsResult<Vec<Scenario>> {
    let path = roots.file(SUITE_FILE)?;
    let invalid = |message: String| AnalysisError::Manifest {
        kind: "test suite",
        file: SUITE_FILE.to_string(),
        message,
    };
    let text = std::fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
    Ok(serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?)
}

impl<B: SparqlBackend + ?Sized> Analyzer<'_, B> {
    /// Run every scenario of `tests/spec.json`.
    pub fn run_tests(&self) -> PrivopsResult<Vec<ScenarioReport>> {
        read_suite(self.roots)?
            .iter()
            .map(|scenario| self.run_scenario(scenario))
            .collect()
    }

    /// Load one scenario into a cleared store and check its queries.
    pub fn run_scenario(&self, scenario: &Scenario) -> PrivopsResult<ScenarioReport> {
        tracing::info!(scenario = %scenario.state_dir, "loading scenario");
        self.backend.clear()?;

        let config = self.roots.optional_file(SCENARIO_CONFIG).is_some();
        let mut files = self.roots.entries(&scenario.state_dir)?;
        if config {
            files.push(SCENARIO_CONFIG.to_string());
        }
        self.load_all(&files, &mut AnonIds::new())?;
        if config {
            self.apply_config(SCENARIO_CONFIG)?;
        }
        self.reasoner()?;

        let queries = self.queries();
        let mut failures = Vec::new();
        for test in &scenario.tests {
            tracing::info!(test = %test.query, "running test");
            let rows = queries
                .execute(&test.query)
                .map_err(stage("test", &test.query))?;
            let actual = rows_to_json(rows);
            if actual != test.expected_result {
                tracing::error!(
                    query = %test.query,
                    expected = %test.expected_result,
                    actual = %actual,
                    "test failed"
                );
                failures.push(TestFailure {
                    query: test.query.clone(),
                    expected: test.expected_result.clone(),
                    actual,
                });
            }
        }

        if failures.is_empty() {
            tracing::info!(scenario = %scenario.state_dir, "all tests passed");
        }
        Ok(ScenarioReport {
            state_dir: scenario.state_dir.clone(),
            tests: scenario.tests.len(),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_uses_camel_case_keys() {
        let suite: Vec<Scenario> = serde_json::from_str(
            r#"[{"stateDir": "tests/a", "tests": [
                {"query": "tests/q.rq", "expectedResult": [{"s": "x"}]},
                {"query": "tests/empty.rq", "expectedResult": []}
            ]}]"#,
        )
        .unwrap();
        assert_eq!(suite[0].state_dir, "tests/a");
        assert_eq!(suite[0].tests.len(), 2);
        assert_eq!(suite[0].tests[0].expected_result[0]["s"], "x");
    }

    #[test]
    fn missing_suite_file_is_a_path_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let roots = ConfigRoots::new(tmp.path().join("l"), tmp.path().join("g"));
        let err = read_suite(&roots).unwrap_err();
        assert!(err.to_string().contains("tests/spec.json"));
    }

    #[test]
    fn malformed_suite_is_a_manifest_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let roots = ConfigRoots::new(tmp.path().join("l"), tmp.path().join("g"));
        std::fs::create_dir_all(roots.local.join("tests")).unwrap();
        std::fs::write(roots.local.join(SUITE_FILE), r#"{"stateDir": 1}"#).unwrap();
        let err = read_suite(&roots).unwrap_err();
        assert!(matches!(
            err,
            crate::error::PrivopsError::Analysis(AnalysisError::Manifest { kind: "test suite", .. })
        ));
    }
}
