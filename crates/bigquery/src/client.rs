//! BigQuery query execution client.
//!
//! Provides [`BigQueryClient`] for executing SQL against the BigQuery v2
//! jobs API, with exponential-backoff polling, timeout enforcement, result
//! pagination, and structured result parsing into [`QueryResultSet`].

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fedquery_gcp_auth::{AuthError, TokenProvider};

use crate::config::BigQueryConfig;
use crate::params::{QueryRequest, ValidationError};
use crate::result::{QueryColumn, QueryMetadata, QueryResultSet};
use crate::rows::{decode_rows, TableSchema};

/// How long one jobs API call waits server-side before returning
/// `jobComplete: false`.
const API_WAIT_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur during query execution.
#[derive(Debug, thiserror::Error)]
pub enum BigQueryError {
    /// The query text failed validation or was rejected by the API.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Declared parameters do not line up with the query's references.
    #[error("Parameter binding mismatch: {0}")]
    ParameterMismatch(String),

    /// The credentials are not allowed to run this query.
    #[error("Permission denied (HTTP {status}): {message}")]
    PermissionDenied { status: u16, message: String },

    /// The job reached a terminal error state.
    #[error("Query job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// The job did not finish within the configured timeout.
    #[error("Query job {job_id} timed out after {seconds}s")]
    JobTimeout { job_id: String, seconds: u32 },

    /// Credential resolution or refresh failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Any other API rejection.
    #[error("BigQuery API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to interpret an API response.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<ValidationError> for BigQueryError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::ParameterMismatch(_) | ValidationError::InvalidParameterName(_) => {
                Self::ParameterMismatch(e.to_string())
            }
            other => Self::InvalidQuery(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<serde_json::Value>,
    total_rows: Option<String>,
    total_bytes_processed: Option<String>,
    cache_hit: Option<bool>,
    page_token: Option<String>,
    #[serde(default)]
    errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobError {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for executing queries against BigQuery.
///
/// Wraps the v2 jobs REST API and adds:
/// - Pre-submission query and parameter validation
/// - Exponential-backoff polling with jitter
/// - Timeout enforcement with best-effort cancellation
/// - Result pagination and structured parsing into [`QueryResultSet`]
pub struct BigQueryClient {
    config: BigQueryConfig,
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
}

impl BigQueryClient {
    /// Create a new [`BigQueryClient`] with already-resolved credentials.
    pub fn new(config: BigQueryConfig, http: reqwest::Client, auth: Arc<dyn TokenProvider>) -> Self {
        Self { config, http, auth }
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Execute a query and return the parsed results.
    ///
    /// This performs the full lifecycle:
    /// 1. Validate the query text and parameter bindings
    /// 2. Submit the job
    /// 3. Poll until completion (with exponential backoff)
    /// 4. Fetch all result pages and decode rows
    pub async fn execute_query(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResultSet, BigQueryError> {
        request.validate()?;

        info!(sql = %request.sql, project = %self.config.project_id, "Starting BigQuery query");
        let start = Instant::now();

        // 1. Submit the job.
        let mut body = serde_json::json!({
            "query": request.sql,
            "useLegacySql": false,
            "maxResults": self.config.max_rows,
            "timeoutMs": API_WAIT_MS,
            "requestId": Uuid::new_v4().to_string(),
        });
        if !request.params.is_empty() {
            body["parameterMode"] = "NAMED".into();
            body["queryParameters"] = request
                .params
                .iter()
                .map(|p| p.to_wire())
                .collect::<Vec<_>>()
                .into();
        }
        if let Some(location) = &self.config.location {
            body["location"] = location.clone().into();
        }

        let url = format!(
            "{}/projects/{}/queries",
            self.config.endpoint, self.config.project_id
        );
        let mut response = self.api_post(&url, &body).await?;

        let (job_id, location) = match &response.job_reference {
            Some(job_ref) => (job_ref.job_id.clone(), job_ref.location.clone()),
            None => ("(unknown)".to_string(), self.config.location.clone()),
        };
        info!(job_id = %job_id, "Query job submitted");

        // 2. Poll until complete.
        response = self
            .poll_until_complete(response, &job_id, location.as_deref(), start)
            .await?;

        // 3. Surface job-level errors before touching rows.
        if let Some(job_error) = response.errors.first() {
            let reason = job_error
                .message
                .clone()
                .or_else(|| job_error.reason.clone())
                .unwrap_or_else(|| "unknown".to_string());
            error!(job_id = %job_id, reason = %reason, "Query job failed");
            return Err(BigQueryError::JobFailed { job_id, reason });
        }

        // 4. Collect all pages and decode.
        self.collect_results(response, &job_id, location.as_deref())
            .await
    }

    /// Cancel a running query job (best effort).
    pub async fn cancel_job(&self, job_id: &str, location: Option<&str>) -> Result<(), BigQueryError> {
        info!(job_id = %job_id, "Cancelling query job");

        let mut url = format!(
            "{}/projects/{}/jobs/{}/cancel",
            self.config.endpoint, self.config.project_id, job_id
        );
        if let Some(location) = location {
            url = format!("{}?location={}", url, location);
        }

        let token = self.auth.token().await?;
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token.token)
            .send()
            .await
            .map_err(|e| BigQueryError::Http(format!("cancel request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(read_api_error(status.as_u16(), resp).await);
        }
        info!(job_id = %job_id, "Query cancellation requested");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Poll `getQueryResults` with exponential backoff until the job
    /// completes or the configured timeout is exceeded.
    async fn poll_until_complete(
        &self,
        mut response: QueryResponse,
        job_id: &str,
        location: Option<&str>,
        start: Instant,
    ) -> Result<QueryResponse, BigQueryError> {
        let timeout = Duration::from_secs(self.config.timeout_seconds as u64);

        let initial_delay_ms: u64 = 200;
        let max_delay_ms: u64 = 2000;
        let backoff_factor: f64 = 1.5;

        let mut delay_ms = initial_delay_ms;

        while !response.job_complete {
            debug!(
                job_id = %job_id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Polling query job"
            );

            if start.elapsed() > timeout {
                warn!(
                    job_id = %job_id,
                    timeout_seconds = self.config.timeout_seconds,
                    "Query timed out, cancelling"
                );
                // Best-effort cancel — ignore errors from the cancel itself
                let _ = self.cancel_job(job_id, location).await;
                return Err(BigQueryError::JobTimeout {
                    job_id: job_id.to_string(),
                    seconds: self.config.timeout_seconds,
                });
            }

            // Compute jitter without rand: use nanosecond fraction of current time
            let jitter_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos()
                % 100;
            tokio::time::sleep(Duration::from_millis(delay_ms + jitter_ms as u64)).await;
            delay_ms = ((delay_ms as f64 * backoff_factor) as u64).min(max_delay_ms);

            response = self.get_query_results(job_id, location, None).await?;
        }

        Ok(response)
    }

    /// Decode the completed response and follow page tokens up to the
    /// configured row cap.
    async fn collect_results(
        &self,
        first: QueryResponse,
        job_id: &str,
        location: Option<&str>,
    ) -> Result<QueryResultSet, BigQueryError> {
        let schema = first.schema.unwrap_or_default();
        let columns: Vec<QueryColumn> = schema
            .fields
            .iter()
            .map(|f| QueryColumn {
                name: f.name.clone(),
                data_type: f.field_type.clone(),
            })
            .collect();

        let metadata = QueryMetadata {
            job_id: job_id.to_string(),
            total_rows: parse_u64(first.total_rows.as_deref()),
            bytes_processed: parse_u64(first.total_bytes_processed.as_deref()),
            cache_hit: first.cache_hit.unwrap_or(false),
        };

        let max_rows = self.config.max_rows as usize;
        let mut rows = decode_rows(&schema, &first.rows).map_err(BigQueryError::ParseError)?;
        let mut page_token = first.page_token;

        while let Some(token) = page_token.take() {
            if rows.len() >= max_rows {
                break;
            }
            let page = self
                .get_query_results(job_id, location, Some(&token))
                .await?;
            let mut decoded =
                decode_rows(&schema, &page.rows).map_err(BigQueryError::ParseError)?;
            rows.append(&mut decoded);
            page_token = page.page_token;
        }

        if rows.len() > max_rows {
            rows.truncate(max_rows);
        }
        if (rows.len() as u64) < metadata.total_rows {
            warn!(
                job_id = %job_id,
                fetched = rows.len(),
                total_rows = metadata.total_rows,
                "Row limit reached, result truncated"
            );
        }

        debug!(
            columns = columns.len(),
            rows = rows.len(),
            job_id = %job_id,
            "Parsed BigQuery results"
        );

        Ok(QueryResultSet {
            columns,
            rows,
            metadata,
        })
    }

    async fn get_query_results(
        &self,
        job_id: &str,
        location: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, BigQueryError> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.config.endpoint, self.config.project_id, job_id
        );

        let mut query: Vec<(&str, String)> = vec![
            ("timeoutMs", API_WAIT_MS.to_string()),
            ("maxResults", self.config.max_rows.to_string()),
        ];
        if let Some(location) = location {
            query.push(("location", location.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let token = self.auth.token().await?;
        let resp = self
            .http
            .get(&url)
            .query(&query)
            .bearer_auth(&token.token)
            .send()
            .await
            .map_err(|e| BigQueryError::Http(format!("getQueryResults request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(read_api_error(status.as_u16(), resp).await);
        }
        resp.json()
            .await
            .map_err(|e| BigQueryError::ParseError(format!("invalid query response: {}", e)))
    }

    async fn api_post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<QueryResponse, BigQueryError> {
        let token = self.auth.token().await?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&token.token)
            .json(body)
            .send()
            .await
            .map_err(|e| BigQueryError::Http(format!("query request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(read_api_error(status.as_u16(), resp).await);
        }
        resp.json()
            .await
            .map_err(|e| BigQueryError::ParseError(format!("invalid query response: {}", e)))
    }
}

fn parse_u64(s: Option<&str>) -> u64 {
    s.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Map a non-2xx API response to the matching error variant.
async fn read_api_error(status: u16, resp: reqwest::Response) -> BigQueryError {
    let body = resp.text().await.unwrap_or_default();

    let (message, reason) = match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or(&body)
                .to_string();
            let reason = value
                .get("error")
                .and_then(|e| e.get("errors"))
                .and_then(|errs| errs.get(0))
                .and_then(|e| e.get("reason"))
                .and_then(|r| r.as_str())
                .map(|r| r.to_string());
            (message, reason)
        }
        Err(_) => {
            let mut message = body.trim().to_string();
            if message.len() > 512 {
                message.truncate(512);
            }
            (message, None)
        }
    };

    match status {
        400 => {
            if reason.as_deref() == Some("invalidParameter")
                || message.to_lowercase().contains("parameter")
            {
                BigQueryError::ParameterMismatch(message)
            } else {
                BigQueryError::InvalidQuery(message)
            }
        }
        401 | 403 => BigQueryError::PermissionDenied { status, message },
        _ => BigQueryError::Api { status, message },
    }
}

// ---------------------------------------------------------------------------
// Tests — validation and error mapping only, no network calls
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_bounded() {
        // The jitter calculation should always produce a value in [0, 100).
        for _ in 0..1000 {
            let jitter = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
                % 100;
            assert!(jitter < 100);
        }
    }

    #[test]
    fn error_display_messages() {
        let err = BigQueryError::InvalidQuery("unterminated ` identifier".into());
        assert!(err.to_string().contains("unterminated"));

        let err = BigQueryError::JobFailed {
            job_id: "job_abc".into(),
            reason: "syntax error at [1:8]".into(),
        };
        assert!(err.to_string().contains("job_abc"));
        assert!(err.to_string().contains("syntax error"));

        let err = BigQueryError::JobTimeout {
            job_id: "job_t1".into(),
            seconds: 120,
        };
        assert!(err.to_string().contains("120s"));

        let err = BigQueryError::PermissionDenied {
            status: 403,
            message: "caller lacks bigquery.jobs.create".into(),
        };
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn validation_errors_map_to_distinct_variants() {
        let err: BigQueryError =
            ValidationError::UnbalancedQuote("unterminated ' string literal".into()).into();
        assert!(matches!(err, BigQueryError::InvalidQuery(_)));

        let err: BigQueryError =
            ValidationError::ParameterMismatch("query references undeclared parameter @x".into())
                .into();
        assert!(matches!(err, BigQueryError::ParameterMismatch(_)));
    }
}
