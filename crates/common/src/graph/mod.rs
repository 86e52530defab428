//! Graph store access
//!
//! Provides:
//! - The `GraphStore` trait consumed by the QA pipeline (read-only)
//! - A Neo4j client over the HTTP transactional endpoint
//! - Record and parameter types shared with the query dispatcher

use crate::config::GraphConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One flat field → value row returned by a graph query
pub type GraphRecord = Map<String, Value>;

/// Bound query parameters
pub type QueryParams = Map<String, Value>;

/// Trait for executing parameterized graph-pattern queries
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a read query with bound parameters
    async fn run(&self, query: &str, params: &QueryParams) -> Result<Vec<GraphRecord>>;

    /// Check connectivity
    async fn ping(&self) -> Result<()> {
        self.run("RETURN 1 AS ok", &QueryParams::new()).await.map(|_| ())
    }
}

/// Neo4j client using the HTTP transactional API
pub struct Neo4jHttpStore {
    client: reqwest::Client,
    commit_url: String,
    user: String,
    password: String,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: [Statement<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Statement<'a> {
    statement: &'a str,
    parameters: &'a QueryParams,
    result_data_contents: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

impl Neo4jHttpStore {
    /// Create a new client from configuration
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base = http_base_url(&config.uri)?;
        let commit_url = format!("{}/db/{}/tx/commit", base, config.database);
        info!(url = %commit_url, "Graph store endpoint configured");

        Ok(Self {
            client,
            commit_url,
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn run(&self, query: &str, params: &QueryParams) -> Result<Vec<GraphRecord>> {
        let request = CommitRequest {
            statements: [Statement {
                statement: query,
                parameters: params,
                result_data_contents: ["row"],
            }],
        };

        let response = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GraphStore {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GraphStore {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let body: CommitResponse = response.json().await.map_err(|e| AppError::GraphStore {
            message: format!("Failed to parse response: {}", e),
        })?;

        let records = into_records(body)?;
        debug!(records = records.len(), "Graph query returned");
        Ok(records)
    }
}

fn into_records(body: CommitResponse) -> Result<Vec<GraphRecord>> {
    if let Some(err) = body.errors.first() {
        return Err(AppError::GraphStore {
            message: format!("{}: {}", err.code, err.message),
        });
    }

    let Some(result) = body.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    let columns = result.columns;
    Ok(result
        .data
        .into_iter()
        .map(|row| columns.iter().cloned().zip(row.row).collect::<GraphRecord>())
        .collect())
}

/// Map a driver URI (bolt://, neo4j://) to the HTTP API base URL
pub fn http_base_url(uri: &str) -> Result<String> {
    let uri = uri.trim().trim_end_matches('/');
    let uri = if uri.contains("://") {
        uri.to_string()
    } else {
        format!("http://{}", uri)
    };

    let url = reqwest::Url::parse(&uri).map_err(|e| AppError::Configuration {
        message: format!("Invalid graph URI {}: {}", uri, e),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(uri),
        scheme => {
            // IPv6 hosts come back bracketed
            let host = url.host_str().unwrap_or("localhost");
            Ok(match scheme {
                "bolt+s" | "neo4j+s" | "bolt+ssc" | "neo4j+ssc" => format!("https://{}:7473", host),
                _ => format!("http://{}:7474", host),
            })
        }
    }
}

/// Create the graph store described by configuration
pub fn create_graph_store(config: &GraphConfig) -> Result<Arc<dyn GraphStore>> {
    Ok(Arc::new(Neo4jHttpStore::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_base_url_from_bolt() {
        assert_eq!(http_base_url("bolt://localhost:7687").unwrap(), "http://localhost:7474");
        assert_eq!(http_base_url("neo4j://graph.internal").unwrap(), "http://graph.internal:7474");
        assert_eq!(
            http_base_url("neo4j+s://db.example.com:7687").unwrap(),
            "https://db.example.com:7473"
        );
        assert_eq!(http_base_url("http://localhost:7474/").unwrap(), "http://localhost:7474");
        assert_eq!(http_base_url("localhost:7474").unwrap(), "http://localhost:7474");
    }

    #[test]
    fn test_http_base_url_keeps_ipv6_brackets() {
        assert_eq!(http_base_url("bolt://[::1]:7687").unwrap(), "http://[::1]:7474");
        assert_eq!(
            http_base_url("neo4j+s://[2001:db8::7]:7687").unwrap(),
            "https://[2001:db8::7]:7473"
        );
    }

    #[test]
    fn test_http_base_url_rejects_garbage() {
        assert!(matches!(
            http_base_url("bolt://[::1"),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_rows_zip_with_columns() {
        let body: CommitResponse = serde_json::from_value(json!({
            "results": [{
                "columns": ["combo_name", "sub_combos"],
                "data": [
                    {"row": ["智三针", ["四神针"]], "meta": [null, null]},
                    {"row": ["颞三针", []], "meta": [null, null]}
                ]
            }],
            "errors": []
        }))
        .unwrap();

        let records = into_records(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["combo_name"], "智三针");
        assert_eq!(records[0]["sub_combos"], json!(["四神针"]));
        assert_eq!(records[1]["sub_combos"], json!([]));
    }

    #[test]
    fn test_statement_errors_become_graph_store_errors() {
        let body: CommitResponse = serde_json::from_value(json!({
            "results": [],
            "errors": [{
                "code": "Neo.ClientError.Statement.SyntaxError",
                "message": "Invalid input"
            }]
        }))
        .unwrap();

        let err = into_records(body).unwrap_err();
        assert!(matches!(err, AppError::GraphStore { .. }));
        assert!(err.to_string().contains("SyntaxError"));
    }

    #[test]
    fn test_request_binds_parameters() {
        let mut params = QueryParams::new();
        params.insert("disease_name".into(), json!("失眠"));
        let request = CommitRequest {
            statements: [Statement {
                statement: "MATCH (d:Disease {name: $disease_name}) RETURN d.name AS disease",
                parameters: &params,
                result_data_contents: ["row"],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["statements"][0]["parameters"]["disease_name"], "失眠");
        assert_eq!(json["statements"][0]["resultDataContents"][0], "row");
    }
}
