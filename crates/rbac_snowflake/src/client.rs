//! Snowflake SQL API client
//!
//! Submits one statement per request to `POST /api/v2/statements`. A `202`
//! means the statement is still running: the handle is polled until it
//! completes or the statement timeout passes. Large results arrive in
//! partitions, fetched with `?partition=n` and concatenated.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use rbac_core::ports::PlatformResult;
use rbac_core::PlatformError;

const STATEMENTS_PATH: &str = "/api/v2/statements";
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Connection settings for the SQL API.
#[derive(Debug, Clone)]
pub struct SnowflakeConfig {
    /// e.g. `https://myorg-myaccount.snowflakecomputing.com`
    pub account_url: String,
    pub token: String,
    /// `OAUTH`, `KEYPAIR_JWT` or `PROGRAMMATIC_ACCESS_TOKEN`
    pub token_type: String,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub statement_timeout: Duration,
    pub poll_interval: Duration,
}

impl SnowflakeConfig {
    pub fn new(account_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account_url: account_url.into(),
            token: token.into(),
            token_type: "OAUTH".to_string(),
            warehouse: None,
            role: None,
            statement_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

// ============================================================================
// RESULT SET
// ============================================================================

/// Rows returned by one statement. Every cell is text or NULL, as the SQL
/// API delivers it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: &[&str], rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Status text of a DDL/DCL statement (single `status` cell).
    pub fn status_message(&self) -> Option<&str> {
        self.iter().next().and_then(|row| row.get("status"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Option<String>],
}

impl<'a> Row<'a> {
    /// Cell by column name, case-insensitive.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get(index)?.as_deref()
    }
}

/// Executes SQL text and returns its rows. The seam between catalog logic
/// and transport.
#[async_trait]
pub trait StatementRunner: Send + Sync {
    async fn run(&self, statement: &str) -> PlatformResult<ResultSet>;
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowType {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[serde(default)]
    row_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

/// Body of a `200` (complete) or `202` (running) response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

/// Body of a `422` (statement failed) response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementFailure {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

fn parse_response(body: &str) -> PlatformResult<StatementResponse> {
    serde_json::from_str(body).map_err(|e| PlatformError::Protocol(format!("malformed statement response: {}", e)))
}

fn parse_failure(body: &str) -> PlatformError {
    match serde_json::from_str::<StatementFailure>(body) {
        Ok(failure) => PlatformError::Rejected {
            code: failure.code,
            message: failure.message,
        },
        Err(_) => PlatformError::rejected(body.trim().to_string()),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct SqlApiClient {
    http: Client,
    config: SnowflakeConfig,
}

impl SqlApiClient {
    pub fn new(config: SnowflakeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.statement_timeout + Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SnowflakeConfig {
        &self.config
    }

    fn statements_url(&self) -> String {
        format!("{}{}", self.config.account_url.trim_end_matches('/'), STATEMENTS_PATH)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> PlatformResult<(StatusCode, String)> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Transport(format!("failed to read response body: {}", e)))?;
        Ok((status, body))
    }

    async fn submit(&self, statement: &str) -> PlatformResult<(StatusCode, String)> {
        let request_id = uuid::Uuid::new_v4();
        let body = StatementRequest {
            statement,
            timeout: self.config.statement_timeout.as_secs(),
            warehouse: self.config.warehouse.as_deref(),
            role: self.config.role.as_deref(),
        };
        let request = self
            .http
            .post(self.statements_url())
            .query(&[("requestId", request_id.to_string())])
            .json(&body);
        self.send(request).await
    }

    async fn status(&self, handle: &str, partition: Option<usize>) -> PlatformResult<(StatusCode, String)> {
        let mut request = self.http.get(format!("{}/{}", self.statements_url(), handle));
        if let Some(partition) = partition {
            request = request.query(&[("partition", partition)]);
        }
        self.send(request).await
    }

    /// Poll a running statement until it returns a final status.
    async fn await_completion(&self, handle: &str) -> PlatformResult<(StatusCode, String)> {
        let deadline = Instant::now() + self.config.statement_timeout;
        loop {
            sleep(self.config.poll_interval).await;
            let (status, body) = self.status(handle, None).await?;
            if status != StatusCode::ACCEPTED {
                return Ok((status, body));
            }
            if Instant::now() >= deadline {
                return Err(PlatformError::Transport(format!(
                    "statement {} still running after {:?}",
                    handle, self.config.statement_timeout
                )));
            }
            debug!("Statement {} still running", handle);
        }
    }

    async fn collect(&self, response: StatementResponse) -> PlatformResult<ResultSet> {
        let meta = response.result_set_meta_data.unwrap_or(ResultSetMetaData {
            row_type: Vec::new(),
            partition_info: Vec::new(),
        });
        let mut rows = response.data;

        if meta.partition_info.len() > 1 {
            let handle = response
                .statement_handle
                .ok_or_else(|| PlatformError::Protocol("partitioned result without a statement handle".into()))?;
            for partition in 1..meta.partition_info.len() {
                let (status, body) = self.status(&handle, Some(partition)).await?;
                if !status.is_success() {
                    return Err(PlatformError::Transport(format!(
                        "partition {} of {}: HTTP {}",
                        partition, handle, status
                    )));
                }
                rows.extend(parse_response(&body)?.data);
            }
            let expected: u64 = meta.partition_info.iter().map(|p| p.row_count).sum();
            if expected != rows.len() as u64 {
                warn!("Statement {} reported {} rows, received {}", handle, expected, rows.len());
            }
        }

        Ok(ResultSet {
            columns: meta.row_type.into_iter().map(|c| c.name).collect(),
            rows,
        })
    }
}

#[async_trait]
impl StatementRunner for SqlApiClient {
    async fn run(&self, statement: &str) -> PlatformResult<ResultSet> {
        debug!(sql = statement, "submitting statement");
        let (mut status, mut body) = self.submit(statement).await?;

        if status == StatusCode::ACCEPTED {
            let handle = parse_response(&body)?
                .statement_handle
                .ok_or_else(|| PlatformError::Protocol("202 response without a statement handle".into()))?;
            (status, body) = self.await_completion(&handle).await?;
        }

        match status {
            StatusCode::OK => self.collect(parse_response(&body)?).await,
            StatusCode::UNPROCESSABLE_ENTITY => Err(parse_failure(&body)),
            other => Err(PlatformError::Transport(format!("HTTP {}: {}", other, body.trim()))),
        }
    }
}
