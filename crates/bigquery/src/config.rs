use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fedquery_core::config::{active_profile, profiled_env_opt, profiled_env_or, profiled_env_u32};
use fedquery_core::ConfigError;

use crate::params::{ParameterValue, QueryParameter, QueryRequest};

/// Default query executed by the service when none is configured.
const DEFAULT_QUERY_SQL: &str = "SELECT * FROM `test.book` LIMIT 10";

/// Default BigQuery REST endpoint.
const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Configuration for the BigQuery query executor.
///
/// Reads from environment variables with optional profile prefix.
/// When `FEDQUERY_PROFILE=PROD`, checks `PROD_GCP_PROJECT_ID` before
/// `GCP_PROJECT_ID`. The query and its parameter bindings are validated here,
/// at startup, so a malformed query never reaches the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    /// Billing project for query jobs.
    pub project_id: String,
    /// The query this service runs.
    pub query_sql: String,
    /// Typed bindings for `@name` references in the query.
    pub query_params: Vec<QueryParameter>,
    /// Job location (e.g. "EU"); omitted when `None`.
    pub location: Option<String>,
    /// Overall query timeout in seconds.
    pub timeout_seconds: u32,
    /// Maximum rows fetched per query (also the page size).
    pub max_rows: u32,
    /// API endpoint; overridable for tests.
    pub endpoint: String,
}

/// A `{"type": ..., "value": ...}` entry in `BIGQUERY_QUERY_PARAMS`.
#[derive(Debug, Deserialize)]
struct RawParam {
    #[serde(rename = "type")]
    type_name: String,
    value: String,
}

impl BigQueryConfig {
    /// Build and validate config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_profiled(&active_profile())
    }

    /// Build and validate config for a specific named profile.
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        let project_id =
            profiled_env_opt(p, "GCP_PROJECT_ID").ok_or(ConfigError::Missing("GCP_PROJECT_ID"))?;

        let query_sql = profiled_env_or(p, "BIGQUERY_QUERY_SQL", DEFAULT_QUERY_SQL);
        let query_params = match profiled_env_opt(p, "BIGQUERY_QUERY_PARAMS") {
            Some(raw) => parse_query_params(&raw)?,
            None => Vec::new(),
        };

        let cfg = Self {
            project_id,
            query_sql,
            query_params,
            location: profiled_env_opt(p, "BIGQUERY_LOCATION"),
            timeout_seconds: profiled_env_u32(p, "BIGQUERY_TIMEOUT_SECONDS", 120),
            max_rows: profiled_env_u32(p, "BIGQUERY_MAX_ROWS", 1000),
            endpoint: profiled_env_or(p, "BIGQUERY_ENDPOINT", DEFAULT_ENDPOINT),
        };

        // Reject a broken query at startup, not on the first request.
        cfg.query_request()
            .validate()
            .map_err(|e| ConfigError::Invalid {
                key: "BIGQUERY_QUERY_SQL",
                reason: e.to_string(),
            })?;

        Ok(cfg)
    }

    /// The configured query with its parameter bindings.
    pub fn query_request(&self) -> QueryRequest {
        QueryRequest::with_params(self.query_sql.clone(), self.query_params.clone())
    }
}

/// Parse `BIGQUERY_QUERY_PARAMS`: a JSON object of name → {type, value}.
fn parse_query_params(raw: &str) -> Result<Vec<QueryParameter>, ConfigError> {
    // BTreeMap keeps parameter order deterministic.
    let entries: BTreeMap<String, RawParam> =
        serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
            key: "BIGQUERY_QUERY_PARAMS",
            reason: format!("not a JSON object of name to {{type, value}}: {}", e),
        })?;

    let mut params = Vec::with_capacity(entries.len());
    for (name, entry) in entries {
        let value = ParameterValue::from_typed_str(&entry.type_name, &entry.value).map_err(
            |reason| ConfigError::Invalid {
                key: "BIGQUERY_QUERY_PARAMS",
                reason: format!("parameter \"{}\": {}", name, reason),
            },
        )?;
        params.push(QueryParameter::new(name, value));
    }
    Ok(params)
}

// ── Tests ────────────────────────────────────────────────────────
