//! Graph store client for the Neo4j HTTP transaction API

use crate::backends::{GraphConnector, GraphSession, Params, Record};
use crate::config::GraphConfig;
use crate::error::{FlowscopeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: [Statement<'a>; 1],
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: &'a Params,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<StatementError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    data: Vec<RowData>,
}

#[derive(Deserialize)]
struct RowData {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct StatementError {
    code: String,
    message: String,
}

#[derive(Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// Opens sessions against `{url}/db/{database}/tx/commit`
pub struct Neo4jHttpConnector {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl Neo4jHttpConnector {
    pub fn from_config(config: &GraphConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/db/{}/tx/commit",
                config.url.trim_end_matches('/'),
                config.database
            ),
            credentials: Credentials {
                username: config.username.clone(),
                password: std::env::var(&config.password_env).ok(),
            },
        })
    }
}

#[async_trait]
impl GraphConnector for Neo4jHttpConnector {
    async fn connect(&self) -> Result<Box<dyn GraphSession>> {
        Ok(Box::new(Neo4jHttpSession {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            credentials: self.credentials.clone(),
        }))
    }
}

/// One logical session; each `run` is an auto-committed transaction
pub struct Neo4jHttpSession {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

#[async_trait]
impl GraphSession for Neo4jHttpSession {
    async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Record>> {
        let body = CommitRequest {
            statements: [Statement {
                statement: query,
                parameters: params,
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.credentials.username, self.credentials.password.as_ref())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlowscopeError::backend(
                "graph",
                format!("HTTP {}", status),
            ));
        }

        let parsed: CommitResponse = response.json().await?;
        if let Some(err) = parsed.errors.first() {
            return Err(FlowscopeError::backend(
                "graph",
                format!("{}: {}", err.code, err.message),
            ));
        }

        Ok(parsed
            .results
            .into_iter()
            .next()
            .map(zip_rows)
            .unwrap_or_default())
    }
}

fn zip_rows(result: StatementResult) -> Vec<Record> {
    result
        .data
        .into_iter()
        .map(|data| {
            result
                .columns
                .iter()
                .cloned()
                .zip(data.row)
                .collect::<Record>()
        })
        .collect()
}
