//! SPARQL 1.1 protocol client.
//!
//! Queries are POSTed to `http://host:port/dataset/query` and updates to
//! `.../update`, with the raw SPARQL text as the request body. Results are
//! read from the `application/sparql-results+json` format and every bound
//! term is flattened to its `value` string.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;

use crate::config::EndpointConfig;
use crate::error::{QueryError, QueryResult};

use super::{Binding, SparqlBackend};

/// A remote SPARQL endpoint (Fuseki-style dataset URL).
pub struct SparqlEndpoint {
    agent: ureq::Agent,
    base_url: String,
    authorization: Option<String>,
}

impl SparqlEndpoint {
    pub fn new(config: &EndpointConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let authorization = config.username.as_ref().map(|user| {
            let password = config.password.as_deref().unwrap_or_default();
            let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
            format!("Basic {token}")
        });
        Self {
            agent,
            base_url: config.base_url(),
            authorization,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, operation: &str, body: &str) -> QueryResult<ureq::Response> {
        let url = format!("{}/{operation}", self.base_url);
        tracing::debug!(%url, bytes = body.len(), "sending SPARQL {operation}");

        let mut request = self
            .agent
            .post(&url)
            .set("Content-Type", &format!("application/sparql-{operation}"))
            .set("Accept", "application/sparql-results+json, application/json");
        if let Some(auth) = &self.authorization {
            request = request.set("Authorization", auth);
        }

        match request.send_string(body) {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, response)) => Err(QueryError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => Err(QueryError::Transport {
                message: format!("{url}: {transport}"),
            }),
        }
    }
}

impl SparqlBackend for SparqlEndpoint {
    fn select(&self, query: &str) -> QueryResult<Vec<Binding>> {
        let body = self
            .post("query", query)?
            .into_string()
            .map_err(|e| QueryError::Transport {
                message: format!("failed to read response body: {e}"),
            })?;
        parse_results(&body)
    }

    fn update(&self, update: &str) -> QueryResult<()> {
        self.post("update", update).map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct ResultsDocument {
    results: Option<ResultSet>,
    boolean: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    bindings: Vec<BTreeMap<String, BoundTerm>>,
}

#[derive(Debug, Deserialize)]
struct BoundTerm {
    value: String,
}

/// Decode a SPARQL JSON results document into flattened rows.
pub(crate) fn parse_results(body: &str) -> QueryResult<Vec<Binding>> {
    let doc: ResultsDocument =
        serde_json::from_str(body).map_err(|e| QueryError::MalformedResponse {
            message: e.to_string(),
        })?;

    match (doc.results, doc.boolean) {
        (Some(set), _) => Ok(set
            .bindings
            .into_iter()
            .map(|row| row.into_iter().map(|(var, term)| (var, term.value)).collect())
            .collect()),
        (None, Some(b)) => Ok(vec![Binding::from([("result".to_string(), b.to_string())])]),
        (None, None) => Err(QueryError::MalformedResponse {
            message: "response has neither `results` nor `boolean`".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_bindings_to_values() {
        let body = r#"{
            "head": {"vars": ["s", "n"]},
            "results": {"bindings": [
                {"s": {"type": "uri", "value": "https://example.com/a"},
                 "n": {"type": "literal", "value": "3",
                       "datatype": "http://www.w3.org/2001/XMLSchema#integer"}},
                {"s": {"type": "bnode", "value": "b0"}}
            ]}
        }"#;
        let rows = parse_results(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["s"], "https://example.com/a");
        assert_eq!(rows[0]["n"], "3");
        assert_eq!(rows[1].len(), 1);
    }

    #[test]
    fn empty_bindings_are_not_an_error() {
        let rows = parse_results(r#"{"head": {"vars": []}, "results": {"bindings": []}}"#).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn ask_result_becomes_one_row() {
        let rows = parse_results(r#"{"head": {}, "boolean": true}"#).unwrap();
        assert_eq!(rows[0]["result"], "true");
    }

    #[test]
    fn missing_results_is_malformed() {
        assert!(matches!(
            parse_results(r#"{"head": {}}"#),
            Err(QueryError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_results("<html>oops</html>"),
            Err(QueryError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn endpoint_builds_dataset_url_and_basic_auth() {
        let config = EndpointConfig {
            username: Some("admin".into()),
            password: Some("secret".into()),
            ..EndpointConfig::default()
        };
        let endpoint = SparqlEndpoint::new(&config);
        assert_eq!(endpoint.base_url(), "http://localhost:3030/tmp");
        assert_eq!(endpoint.authorization.as_deref(), Some("Basic YWRtaW46c2VjcmV0"));
    }

    #[test]
    fn unreachable_endpoint_is_a_transport_error() {
        let config = EndpointConfig {
            host: "127.0.0.1".into(),
            port: 1,
            timeout_secs: 2,
            ..EndpointConfig::default()
        };
        let err = SparqlEndpoint::new(&config).select("SELECT * {}").unwrap_err();
        assert!(matches!(err, QueryError::Transport { .. }));
    }
}
