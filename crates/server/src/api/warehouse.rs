//! BigQuery query endpoint.
//!
//! One GET endpoint: resolve credentials, run the configured query, return
//! the rows. All failures map to a uniform 500 `{"error": ...}` payload;
//! the error taxonomy (config / auth / query) is preserved in the logs.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{error, info};

use fedquery_bigquery::{BigQueryClient, BigQueryError};
use fedquery_core::ConfigError;
use fedquery_gcp_auth::{resolve, AuthError};

use crate::state::AppState;

use super::QueryErrorResponse;

// ── Response types ───────────────────────────────────────────────

#[derive(Serialize, utoipa::ToSchema)]
pub struct QueryDataResponse {
    /// Result rows, one JSON object per row, in job order.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<serde_json::Map<String, serde_json::Value>>,
}

// ── Error taxonomy ───────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Query(#[from] BigQueryError),
}

impl HandlerError {
    /// Tag for log lines; the external payload stays uniform.
    fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Auth(_) | Self::Query(BigQueryError::Auth(_)) => "auth",
            Self::Query(_) => "query",
        }
    }
}

// ── Handler ──────────────────────────────────────────────────────

/// Run the configured BigQuery query
///
/// Resolves credentials (federated workload-identity exchange or ambient
/// default credentials, per config), executes the configured query as an
/// asynchronous job, and returns the result rows.
#[utoipa::path(
    get,
    path = "/api/bigquery",
    tag = "BigQuery",
    responses(
        (status = 200, description = "Query results", body = QueryDataResponse),
        (status = 500, description = "Resolution or query failure", body = QueryErrorResponse)
    )
)]
pub async fn bigquery_query(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QueryDataResponse>, (StatusCode, Json<QueryErrorResponse>)> {
    match run_configured_query(&state).await {
        Ok(data) => Ok(Json(QueryDataResponse { data })),
        Err(e) => {
            error!(kind = e.kind(), error = %e, "BigQuery endpoint error");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(QueryErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

async fn run_configured_query(
    state: &AppState,
) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, HandlerError> {
    // Credentials are resolved fresh per request; only the HTTP connection
    // pool is shared between invocations.
    let credentials = resolve(&state.config.auth, &state.http)?;

    let client = BigQueryClient::new(
        state.config.bigquery.clone(),
        state.http.clone(),
        Arc::new(credentials),
    );

    let result = client
        .execute_query(&state.config.bigquery.query_request())
        .await?;

    info!(
        job_id = %result.metadata.job_id,
        rows = result.row_count(),
        cache_hit = result.metadata.cache_hit,
        "Query complete"
    );

    Ok(result.rows)
}
