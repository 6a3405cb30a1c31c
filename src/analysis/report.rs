//! Analysis report and verdict.
//!
//! The report is written as JSON, one file per analysis cycle. Field names
//! follow the manifest files they come from (`"maximum violations"`,
//! `"is misuse case"`, ...) so downstream visualizers can consume both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::attack_tree::ExecutionState;
use crate::attack_tree::eval::EvaluatedNode;
use crate::error::{AnalysisError, AnalysisResult};
use crate::query::Binding;

/// Outcome of one policy query.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyResult {
    pub name: String,
    pub description: String,
    #[serde(rename = "maximum violations")]
    pub maximum_violations: usize,
    #[serde(rename = "is consistency")]
    pub is_consistency: bool,
    pub violations: Vec<Binding>,
    #[serde(rename = "mapping message")]
    pub mapping_message: String,
    #[serde(rename = "clearence level", skip_serializing_if = "Option::is_none")]
    pub clearance_level: Option<i64>,
    pub groups: Vec<String>,
}

impl PolicyResult {
    pub fn is_violated(&self) -> bool {
        self.violations.len() > self.maximum_violations
    }
}

/// All policies of one regulation.
#[derive(Debug, Clone, Serialize)]
pub struct RegulationReport {
    pub name: String,
    pub results: Vec<PolicyResult>,
}

/// One evaluated attack or harm tree.
#[derive(Debug, Clone, Serialize)]
pub struct TreeReport {
    /// Tree description file, relative to the configuration roots.
    pub file: String,
    pub root: EvaluatedNode,
    /// Why evaluation stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one requirement query.
#[derive(Debug, Clone, Serialize)]
pub struct RequirementResult {
    pub title: String,
    pub description: String,
    pub results: Vec<Binding>,
}

/// Requirements of one use case (or misuse case).
#[derive(Debug, Clone, Serialize)]
pub struct UserStoryReport {
    #[serde(rename = "use case")]
    pub use_case: String,
    #[serde(rename = "is misuse case")]
    pub is_misuse_case: bool,
    pub requirements: Vec<RequirementResult>,
    #[serde(rename = "clearence level", skip_serializing_if = "Option::is_none")]
    pub clearance_level: Option<i64>,
    pub groups: Vec<String>,
}

impl UserStoryReport {
    /// Requirements whose outcome contradicts the story's intent: a use case
    /// query that found nothing, or a misuse case query that found something.
    pub fn unmet(&self) -> impl Iterator<Item = &RequirementResult> {
        self.requirements
            .iter()
            .filter(|r| r.results.is_empty() != self.is_misuse_case)
    }
}

/// Everything one analysis cycle found.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// System configuration name (file stem), if one was applied.
    pub config: Option<String>,
    pub project: String,
    /// Unix timestamp of the cycle.
    pub time: u64,
    pub policies: Vec<RegulationReport>,
    #[serde(rename = "attack trees")]
    pub attack_trees: Vec<TreeReport>,
    #[serde(rename = "user stories")]
    pub user_stories: Vec<UserStoryReport>,
    #[serde(rename = "extra data")]
    pub extra_data: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl CycleReport {
    /// File the cycle is written to: `report.json` or `report_<config>.json`.
    pub fn file_name(&self) -> String {
        match &self.config {
            Some(name) => format!("report_{name}.json"),
            None => "report.json".to_string(),
        }
    }

    pub fn verdict(&self) -> Verdict {
        let violated_policies = self
            .policies
            .iter()
            .flat_map(|reg| &reg.results)
            .filter(|p| p.is_violated())
            .map(|p| p.name.clone())
            .collect();

        let unmet_requirements = self
            .user_stories
            .iter()
            .flat_map(UserStoryReport::unmet)
            .map(|r| r.title.clone())
            .collect();

        let possible_attacks = self
            .attack_trees
            .iter()
            .filter(|t| t.root.state == ExecutionState::Possible)
            .map(|t| t.root.description.clone())
            .collect();

        let failed_trees = self
            .attack_trees
            .iter()
            .filter(|t| t.error.is_some())
            .map(|t| t.file.clone())
            .collect();

        Verdict {
            violated_policies,
            unmet_requirements,
            possible_attacks,
            failed_trees,
        }
    }

    /// Write the cycle as pretty JSON into `dir`. Returns the file path.
    pub fn write_to(&self, dir: &Path) -> AnalysisResult<PathBuf> {
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self).map_err(|e| AnalysisError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| AnalysisError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), "report written");
        Ok(path)
    }

    /// POST the cycle as JSON to a report visualizer.
    pub fn send_to(&self, url: &str, timeout: Duration) -> AnalysisResult<()> {
        tracing::info!(url, "sending report to visualizer");
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let response = agent
            .post(url)
            .send_json(self)
            .map_err(|e| AnalysisError::Send {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        tracing::info!(url, status = response.status(), "report sent");
        Ok(())
    }
}

/// Findings that fail a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Policies with more violations than they allow.
    pub violated_policies: Vec<String>,
    /// Requirements that are not met, or misuse cases that are.
    pub unmet_requirements: Vec<String>,
    /// Trees whose root condition is possible.
    pub possible_attacks: Vec<String>,
    /// Trees whose evaluation stopped on an error.
    pub failed_trees: Vec<String>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.violated_policies.is_empty()
            && self.unmet_requirements.is_empty()
            && self.possible_attacks.is_empty()
            && self.failed_trees.is_empty()
    }

    /// Log every finding at error level.
    pub fn log(&self) {
        let sections = [
            ("policies with too many violations", &self.violated_policies),
            ("unmet requirements", &self.unmet_requirements),
            ("possible attacks", &self.possible_attacks),
            ("failed attack trees", &self.failed_trees),
        ];
        for (what, items) in sections {
            if items.is_empty() {
                continue;
            }
            tracing::error!("there are {what}");
            for item in items {
                tracing::error!("  - {item}");
            }
        }
    }
}

/// Reports of every cycle in one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub cycles: Vec<CycleReport>,
}

impl Report {
    /// True when no cycle has a finding.
    pub fn passed(&self) -> bool {
        self.cycles.iter().all(|c| c.verdict().passed())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    use super::*;

    fn node(description: &str, state: ExecutionState) -> EvaluatedNode {
        EvaluatedNode {
            description: description.into(),
            query: "q.rq".into(),
            state,
            result: None,
            children: Vec::new(),
        }
    }

    fn row() -> Binding {
        Binding::from([("s".to_string(), "x".to_string())])
    }

    fn policy(name: &str, max: usize, violations: usize) -> PolicyResult {
        PolicyResult {
            name: name.into(),
            description: String::new(),
            maximum_violations: max,
            is_consistency: false,
            violations: vec![row(); violations],
            mapping_message: String::new(),
            clearance_level: None,
            groups: Vec::new(),
        }
    }

    fn story(misuse: bool, results: &[usize]) -> UserStoryReport {
        UserStoryReport {
            use_case: "u".into(),
            is_misuse_case: misuse,
            requirements: results
                .iter()
                .enumerate()
                .map(|(i, &n)| RequirementResult {
                    title: format!("r{i}"),
                    description: String::new(),
                    results: vec![row(); n],
                })
                .collect(),
            clearance_level: None,
            groups: Vec::new(),
        }
    }

    fn cycle() -> CycleReport {
        CycleReport {
            config: None,
            project: "shop".into(),
            time: 0,
            policies: Vec::new(),
            attack_trees: Vec::new(),
            user_stories: Vec::new(),
            extra_data: Vec::new(),
        }
    }

    #[test]
    fn empty_cycle_passes() {
        assert!(cycle().verdict().passed());
        assert_eq!(cycle().file_name(), "report.json");
    }

    #[test]
    fn policy_fails_only_above_its_maximum() {
        let mut c = cycle();
        c.policies.push(RegulationReport {
            name: "gdpr".into(),
            results: vec![policy("at limit", 1, 1), policy("over", 0, 2)],
        });
        assert_eq!(c.verdict().violated_policies, vec!["over"]);
    }

    #[test]
    fn requirements_depend_on_misuse_flag() {
        let mut c = cycle();
        c.user_stories.push(story(false, &[0, 1]));
        c.user_stories.push(story(true, &[0, 2]));
        // use case: r0 (empty) unmet; misuse case: r1 (rows) met → unmet
        assert_eq!(c.verdict().unmet_requirements, vec!["r0", "r1"]);
    }

    #[test]
    fn possible_roots_and_failed_trees_are_reported() {
        let mut c = cycle();
        c.attack_trees.push(TreeReport {
            file: "attack_trees/descriptions/a.yml".into(),
            root: node("Leak", ExecutionState::Possible),
            error: None,
        });
        c.attack_trees.push(TreeReport {
            file: "attack_trees/descriptions/b.yml".into(),
            root: node("Tamper", ExecutionState::NotExecuted),
            error: Some("query not found".into()),
        });
        c.attack_trees.push(TreeReport {
            file: "attack_trees/descriptions/c.yml".into(),
            root: node("Spoof", ExecutionState::NotPossible),
            error: None,
        });

        let verdict = c.verdict();
        assert_eq!(verdict.possible_attacks, vec!["Leak"]);
        assert_eq!(verdict.failed_trees, vec!["attack_trees/descriptions/b.yml"]);
        assert!(!verdict.passed());

        let report = Report { cycles: vec![c] };
        assert!(!report.passed());
    }

    #[test]
    fn serializes_with_manifest_field_names() {
        let mut c = cycle();
        c.config = Some("prod".into());
        c.policies.push(RegulationReport {
            name: "gdpr".into(),
            results: vec![policy("p", 0, 0)],
        });
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["policies"][0]["results"][0]["maximum violations"], 0);
        assert!(json.get("attack trees").is_some());
        assert_eq!(c.file_name(), "report_prod.json");
    }

    /// Accept one request and answer 200. Yields the request head and body.
    fn accept_one(listener: TcpListener) -> std::thread::JoinHandle<(String, String)> {
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
            }
            let mut body = vec![0; length];
            reader.read_exact(&mut body).unwrap();
            reader
                .get_mut()
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
            (head, String::from_utf8(body).unwrap())
        })
    }

    #[test]
    fn send_to_posts_the_cycle_as_json() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/report", listener.local_addr().unwrap());
        let server = accept_one(listener);

        let mut c = cycle();
        c.config = Some("prod".into());
        c.attack_trees.push(TreeReport {
            file: "attack_trees/descriptions/a.yml".into(),
            root: node("Leak", ExecutionState::Possible),
            error: None,
        });
        c.send_to(&url, Duration::from_secs(5)).unwrap();

        let (head, body) = server.join().unwrap();
        assert!(head.starts_with("POST /report HTTP/1.1"));
        assert!(head.to_ascii_lowercase().contains("content-type: application/json"));

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["config"], "prod");
        assert_eq!(json["project"], "shop");
        assert_eq!(json["attack trees"][0]["root"]["execution status"], "POSSIBLE");
    }

    #[test]
    fn unreachable_report_endpoint_is_a_send_error() {
        let err = cycle()
            .send_to("http://127.0.0.1:1/report", Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Send { ref url, .. } if url == "http://127.0.0.1:1/report"));
    }

    #[test]
    fn write_to_creates_named_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = cycle().write_to(tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join("report.json"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("\"project\": \"shop\""));
    }
}
