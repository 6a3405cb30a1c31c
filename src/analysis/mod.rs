//! Analysis cycle orchestration.
//!
//! One cycle runs against a freshly cleared graph store:
//!
//! 1. Compile and insert every file under `descriptions/`.
//! 2. If a system configuration is selected, insert it and substitute
//!    configured values into the description facts.
//! 3. Run the `reasoner/` update rules in name order.
//! 4. Run the policies of every regulation under `regulations/`.
//! 5. Evaluate every tree under `attack_trees/descriptions/`.
//! 6. Check the use and misuse cases in `requirements/requirements.yml`.
//! 7. Collect the extra rows requested by `report_data/report_data.yml`.
//!
//! [`Analyzer::run`] performs one cycle per file under `config/`, or a single
//! cycle when there are none. Regression scenarios from `tests/spec.json`
//! reuse the loading and reasoning steps (see [`suite`]).

pub mod report;
pub mod schema;
pub mod suite;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::attack_tree::AttackTree;
use crate::attack_tree::eval::TreeEvaluator;
use crate::document::Value;
use crate::error::{AnalysisError, PrivopsError, PrivopsResult};
use crate::graph::Triple;
use crate::graph::compile::{AnonIds, Compiler};
use crate::graph::iri::AbbreviationTable;
use crate::query::{Binding, QueryExecutor, QueryFiles, SparqlBackend};
use crate::paths::ConfigRoots;

use self::report::{
    CycleReport, PolicyResult, RegulationReport, Report, RequirementResult, TreeReport,
    UserStoryReport,
};

/// Abbreviation table, relative to the configuration roots.
pub const URIS_FILE: &str = "uris.yml";
pub const DESCRIPTIONS_DIR: &str = "descriptions";
pub const CONFIGS_DIR: &str = "config";
pub const REASONER_DIR: &str = "reasoner";
pub const REGULATIONS_DIR: &str = "regulations";
pub const TREES_DIR: &str = "attack_trees/descriptions";
pub const REQUIREMENTS_FILE: &str = "requirements/requirements.yml";
pub const REPORT_DATA_FILE: &str = "report_data/report_data.yml";

/// Predicate linking a configurable object to its configured value.
pub const CONFIG_VALUE: &str = "https://devprivops.com/config/value";

/// Replace every object that has a configured value with that value.
fn apply_config_update() -> String {
    format!(
        "DELETE {{ ?s ?p ?o . }}\n\
         INSERT {{ ?s ?p ?value . }}\n\
         WHERE {{ ?s ?p ?o . ?o <{CONFIG_VALUE}> ?value . }}"
    )
}

/// Checks a description before it is compiled.
pub trait DocumentValidator {
    /// Violations found in `doc` (read from `file`); empty when valid.
    fn validate(&self, file: &str, doc: &Value) -> PrivopsResult<Vec<String>>;
}

/// One entry of a regulation's `policies.yml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    pub title: String,
    pub description: String,
    /// Query reference.
    pub file: String,
    #[serde(rename = "is consistency")]
    pub is_consistency: bool,
    #[serde(rename = "maximum violations")]
    pub maximum_violations: usize,
    #[serde(rename = "mapping message")]
    pub mapping_message: String,
    #[serde(rename = "clearence level", default)]
    pub clearance_level: Option<i64>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// One entry of `requirements.yml`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserStory {
    #[serde(rename = "use case")]
    pub use_case: String,
    #[serde(rename = "is misuse case")]
    pub is_misuse_case: bool,
    pub requirements: Vec<Requirement>,
    #[serde(rename = "clearence level", default)]
    pub clearance_level: Option<i64>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Requirement {
    pub title: String,
    pub description: String,
    /// Query reference.
    pub query: String,
}

/// Wrap an error with the stage and file it happened in.
fn stage<E: Into<PrivopsError>>(stage: &'static str, file: &str) -> impl FnOnce(E) -> PrivopsError {
    move |e| {
        AnalysisError::Stage {
            stage,
            file: file.to_string(),
            source: Box::new(e.into()),
        }
        .into()
    }
}

/// Runs analysis cycles against one graph store.
pub struct Analyzer<'a, B: SparqlBackend + ?Sized> {
    roots: &'a ConfigRoots,
    backend: &'a B,
    table: AbbreviationTable,
    validator: Option<&'a dyn DocumentValidator>,
    project: String,
}

impl<'a, B: SparqlBackend + ?Sized> Analyzer<'a, B> {
    /// Create an analyzer, loading `uris.yml` from the roots.
    pub fn new(roots: &'a ConfigRoots, backend: &'a B) -> PrivopsResult<Self> {
        let path = roots.file(URIS_FILE)?;
        let table = AbbreviationTable::load(&path)?;
        tracing::debug!(prefixes = table.len(), "loaded abbreviation table");
        Ok(Self::with_table(roots, backend, table))
    }

    pub fn with_table(roots: &'a ConfigRoots, backend: &'a B, table: AbbreviationTable) -> Self {
        let project = std::env::current_dir()
            .ok()
            .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        Self {
            roots,
            backend,
            table,
            validator: None,
            project,
        }
    }

    pub fn with_validator(mut self, validator: &'a dyn DocumentValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn table(&self) -> &AbbreviationTable {
        &self.table
    }

    fn queries(&self) -> QueryFiles<'a, B> {
        QueryFiles::new(self.roots, self.backend)
    }

    /// System configuration files, as paths relative to the roots.
    pub fn configs(&self) -> PrivopsResult<Vec<String>> {
        Ok(self.roots.entries(CONFIGS_DIR)?)
    }

    /// Run one cycle per configuration, or one plain cycle without any.
    pub fn run(&self) -> PrivopsResult<Report> {
        self.run_with(|_| Ok(()))
    }

    /// Like [`Analyzer::run`], handing each cycle to `finished` as soon as it
    /// completes. A failing cycle stops the run after earlier cycles were
    /// handed over.
    pub fn run_with(
        &self,
        mut finished: impl FnMut(&CycleReport) -> PrivopsResult<()>,
    ) -> PrivopsResult<Report> {
        let configs = self.configs()?;
        let selected: Vec<Option<&str>> = if configs.is_empty() {
            vec![None]
        } else {
            configs.iter().map(|c| Some(c.as_str())).collect()
        };

        let mut cycles = Vec::with_capacity(selected.len());
        for config in selected {
            let cycle = self.cycle(config)?;
            finished(&cycle)?;
            cycles.push(cycle);
        }
        Ok(Report { cycles })
    }

    /// Run a single cycle, optionally applying the configuration file `config`.
    pub fn cycle(&self, config: Option<&str>) -> PrivopsResult<CycleReport> {
        tracing::info!(config = config.unwrap_or("none"), "starting analysis cycle");
        self.backend.clear()?;

        let mut files = self.roots.entries(DESCRIPTIONS_DIR)?;
        files.extend(config.map(str::to_string));
        self.load_all(&files, &mut AnonIds::new())?;
        if let Some(config) = config {
            self.apply_config(config)?;
        }

        self.reasoner()?;
        let policies = self.policies()?;
        let attack_trees = self.attack_trees()?;
        let user_stories = self.requirements()?;
        let extra_data = self.extra_data()?;

        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let report = CycleReport {
            config: config.map(config_name),
            project: self.project.clone(),
            time,
            policies,
            attack_trees,
            user_stories,
            extra_data,
        };
        let verdict = report.verdict();
        if verdict.passed() {
            tracing::info!("cycle passed");
        } else {
            verdict.log();
        }
        Ok(report)
    }

    /// Read and validate one description file.
    pub fn read_description(&self, file: &str) -> PrivopsResult<Value> {
        let path = self.roots.file(file)?;
        let doc = Value::read(&path).map_err(stage("read description", file))?;

        if let Some(validator) = self.validator {
            let violations = validator.validate(file, &doc)?;
            if !violations.is_empty() {
                return Err(AnalysisError::SchemaViolation {
                    file: file.to_string(),
                    violations,
                }
                .into());
            }
        }
        Ok(doc)
    }

    /// Compile and insert `files` in order. Explicit ids of every file are
    /// reserved before the first anonymous id is drawn from `ids`.
    fn load_all(&self, files: &[String], ids: &mut AnonIds) -> PrivopsResult<()> {
        let mut docs = Vec::with_capacity(files.len());
        for file in files {
            let doc = self.read_description(file)?;
            let compiler =
                Compiler::for_file(&self.table, file).map_err(stage("compile", file))?;
            compiler.reserve(&doc, ids);
            docs.push((file, compiler, doc));
        }

        for (file, compiler, doc) in docs {
            let triples: Vec<Triple> = compiler
                .compile(&doc, &compiler.root(), ids)
                .map_err(stage("compile", file))?;
            tracing::info!(file = %file, facts = triples.len(), "loading description");
            self.backend
                .insert(&triples, &self.table)
                .map_err(stage("insert facts", file))?;
        }
        Ok(())
    }

    fn apply_config(&self, config: &str) -> PrivopsResult<()> {
        self.backend
            .update(&apply_config_update())
            .map_err(stage("apply configuration", config))
    }

    fn reasoner(&self) -> PrivopsResult<()> {
        let queries = self.queries();
        for rule in self.roots.entries(REASONER_DIR)? {
            tracing::info!(rule = %rule, "running reasoner rule");
            queries
                .run_update_file(&rule)
                .map_err(stage("reasoner rule", &rule))?;
        }
        Ok(())
    }

    fn manifest<T: DeserializeOwned>(&self, kind: &'static str, file: &str) -> PrivopsResult<T> {
        let path = self.roots.file(file)?;
        let invalid = |message: String| AnalysisError::Manifest {
            kind,
            file: file.to_string(),
            message,
        };
        let text = std::fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        Ok(serde_yaml::from_str(&text).map_err(|e| invalid(e.to_string()))?)
    }

    fn policies(&self) -> PrivopsResult<Vec<RegulationReport>> {
        let queries = self.queries();
        let mut regulations = Vec::new();
        for regulation in self.roots.subdirs(REGULATIONS_DIR)? {
            let file = format!("{REGULATIONS_DIR}/{regulation}/policies.yml");
            let policies: Vec<Policy> = self.manifest("policy", &file)?;

            let mut results = Vec::with_capacity(policies.len());
            for policy in policies {
                let violations = queries
                    .execute(&policy.file)
                    .map_err(stage("policy", &policy.file))?;
                tracing::info!(
                    regulation = %regulation,
                    policy = %policy.title,
                    violations = violations.len(),
                    maximum = policy.maximum_violations,
                    "policy checked"
                );
                results.push(PolicyResult {
                    name: policy.title,
                    description: policy.description,
                    maximum_violations: policy.maximum_violations,
                    is_consistency: policy.is_consistency,
                    violations,
                    mapping_message: policy.mapping_message,
                    clearance_level: policy.clearance_level,
                    groups: policy.groups,
                });
            }
            regulations.push(RegulationReport {
                name: regulation,
                results,
            });
        }
        Ok(regulations)
    }

    /// Parse and evaluate one tree description. Evaluation failures are
    /// recorded on the returned report; parse failures are errors.
    pub fn evaluate_tree(&self, file: &str) -> PrivopsResult<TreeReport> {
        let path = self.roots.file(file)?;
        let tree = AttackTree::read(&path).map_err(stage("parse attack tree", file))?;
        let queries = self.queries();
        let outcome = TreeEvaluator::new(&queries).evaluate(&tree);

        let error = outcome.failure.map(|failure| {
            tracing::error!(file, node = %failure.description, error = %failure.source, "attack tree evaluation failed");
            format!("{failure}: {}", failure.source)
        });
        Ok(TreeReport {
            file: file.to_string(),
            root: outcome.root,
            error,
        })
    }

    fn attack_trees(&self) -> PrivopsResult<Vec<TreeReport>> {
        self.roots
            .entries(TREES_DIR)?
            .iter()
            .map(|file| self.evaluate_tree(file))
            .collect()
    }

    fn requirements(&self) -> PrivopsResult<Vec<UserStoryReport>> {
        if self.roots.optional_file(REQUIREMENTS_FILE).is_none() {
            tracing::debug!("no requirements file");
            return Ok(Vec::new());
        }
        let stories: Vec<UserStory> = self.manifest("requirements", REQUIREMENTS_FILE)?;
        let queries = self.queries();

        let mut reports = Vec::with_capacity(stories.len());
        for story in stories {
            let mut requirements = Vec::with_capacity(story.requirements.len());
            for req in story.requirements {
                let results = queries
                    .execute(&req.query)
                    .map_err(stage("requirement", &req.query))?;
                if results.is_empty() != story.is_misuse_case {
                    if story.is_misuse_case {
                        tracing::error!(requirement = %req.title, "misuse case requirement met");
                    } else {
                        tracing::error!(requirement = %req.title, "requirement not met");
                    }
                }
                requirements.push(RequirementResult {
                    title: req.title,
                    description: req.description,
                    results,
                });
            }
            reports.push(UserStoryReport {
                use_case: story.use_case,
                is_misuse_case: story.is_misuse_case,
                requirements,
                clearance_level: story.clearance_level,
                groups: story.groups,
            });
        }
        Ok(reports)
    }

    fn extra_data(&self) -> PrivopsResult<Vec<serde_json::Map<String, serde_json::Value>>> {
        if self.roots.optional_file(REPORT_DATA_FILE).is_none() {
            return Ok(Vec::new());
        }
        let entries: Vec<serde_json::Map<String, serde_json::Value>> =
            self.manifest("report data", REPORT_DATA_FILE)?;
        let queries = self.queries();

        let mut out = Vec::with_capacity(entries.len());
        for (i, mut entry) in entries.into_iter().enumerate() {
            let query = match entry.remove("query") {
                Some(serde_json::Value::String(q)) => q,
                _ => {
                    return Err(AnalysisError::Manifest {
                        kind: "report data",
                        file: REPORT_DATA_FILE.to_string(),
                        message: format!("entry {i} has no string `query`"),
                    }
                    .into());
                }
            };
            let rows = queries
                .execute(&query)
                .map_err(stage("report data", &query))?;
            tracing::info!(query = %query, rows = rows.len(), "extra report data collected");
            entry.insert("results".to_string(), rows_to_json(rows));
            out.push(entry);
        }
        Ok(out)
    }
}

fn rows_to_json(rows: Vec<Binding>) -> serde_json::Value {
    serde_json::Value::Array(
        rows.into_iter()
            .map(|row| {
                serde_json::Value::Object(
                    row.into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect(),
                )
            })
            .collect(),
    )
}

/// `config/prod.yml` → `prod`.
fn config_name(config: &str) -> String {
    let file = config.rsplit('/').next().unwrap_or(config);
    file.split('.').next().unwrap_or(file).to_string()
}
