//! End-to-end tests for the BigQuery endpoint.
//!
//! The full stack runs in-process: the real router served on an ephemeral
//! port, talking to a mock of the STS exchange, the impersonation endpoint,
//! and the jobs API. No network access or GCP credentials required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde_json::json;

use fedquery_bigquery::BigQueryConfig;
use fedquery_core::ServerConfig;
use fedquery_gcp_auth::{AuthConfig, AuthMode, FederatedConfig, SubjectTokenSourceConfig};
use fedquery_server::{build_router, AppConfig, AppState};

// ── Mock GCP (STS + IAM credentials + jobs API) ──────────────────

#[derive(Default)]
struct MockGcp {
    sts_calls: AtomicUsize,
    query_calls: AtomicUsize,
    last_query_bearer: Mutex<Option<String>>,
}

async fn sts_token(State(state): State<Arc<MockGcp>>) -> impl IntoResponse {
    state.sts_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "access_token": "federated-token",
        "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
        "token_type": "Bearer",
        "expires_in": 3600,
    }))
}

async fn generate_access_token(Path(_sa): Path<String>) -> impl IntoResponse {
    Json(json!({
        "accessToken": "impersonated-token",
        "expireTime": (Utc::now() + Duration::hours(1)).to_rfc3339(),
    }))
}

async fn queries(
    State(state): State<Arc<MockGcp>>,
    Path(_project): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    state.query_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_query_bearer.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    Json(json!({
        "kind": "bigquery#queryResponse",
        "jobReference": {"projectId": "proj", "jobId": "job_e2e_1", "location": "US"},
        "jobComplete": true,
        "schema": {"fields": [
            {"name": "id", "type": "INTEGER", "mode": "NULLABLE"},
            {"name": "name", "type": "STRING", "mode": "NULLABLE"},
        ]},
        "rows": [
            {"f": [{"v": "1"}, {"v": "alice"}]},
            {"f": [{"v": "2"}, {"v": "bob"}]},
        ],
        "totalRows": "2",
        "totalBytesProcessed": "2048",
        "cacheHit": false,
    }))
}

async fn spawn_mock_gcp() -> (String, Arc<MockGcp>) {
    let state = Arc::new(MockGcp::default());
    let app = Router::new()
        .route("/v1/token", post(sts_token))
        .route(
            "/v1/projects/-/serviceAccounts/{service_account}",
            post(generate_access_token),
        )
        .route("/projects/{project}/queries", post(queries))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

// ── App under test ───────────────────────────────────────────────

fn app_config(gcp_base: &str, mode: AuthMode, token_var: &str) -> AppConfig {
    let federated = match mode {
        AuthMode::Federated => Some(FederatedConfig {
            project_number: "123456789012".into(),
            pool_id: "my-pool".into(),
            provider_id: "my-provider".into(),
            service_account_email: "runner@my-project.iam.gserviceaccount.com".into(),
            subject_token: SubjectTokenSourceConfig::EnvVar(token_var.into()),
            sts_endpoint: format!("{}/v1/token", gcp_base),
            iam_credentials_endpoint: gcp_base.to_string(),
        }),
        AuthMode::Ambient => None,
    };

    AppConfig {
        profile: String::new(),
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origin: "*".into(),
        },
        auth: AuthConfig { mode, federated },
        bigquery: BigQueryConfig {
            project_id: "proj".into(),
            query_sql: "SELECT * FROM `test.book` LIMIT 10".into(),
            query_params: vec![],
            location: None,
            timeout_seconds: 5,
            max_rows: 100,
            endpoint: gcp_base.to_string(),
        },
    }
}

async fn spawn_app(config: AppConfig) -> String {
    let state = Arc::new(AppState::new(config));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

// ── Tests ────────────────────────────────────────────────────────

#[tokio::test]
async fn federated_request_returns_rows_as_data() {
    let (gcp, mock) = spawn_mock_gcp().await;
    std::env::set_var("E2E_TOKEN_OK", "subject-jwt");

    let app = spawn_app(app_config(&gcp, AuthMode::Federated, "E2E_TOKEN_OK")).await;
    let resp = reqwest::get(format!("{}/api/bigquery", app)).await.unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({"data": [
            {"id": 1, "name": "alice"},
            {"id": 2, "name": "bob"},
        ]})
    );

    // The query ran with the impersonated token, not the federated one.
    assert_eq!(
        mock.last_query_bearer.lock().unwrap().as_deref(),
        Some("Bearer impersonated-token")
    );

    std::env::remove_var("E2E_TOKEN_OK");
}

#[tokio::test]
async fn failing_subject_token_yields_500_with_error_message() {
    let (gcp, mock) = spawn_mock_gcp().await;

    // Env var intentionally unset.
    let app = spawn_app(app_config(&gcp, AuthMode::Federated, "E2E_TOKEN_MISSING")).await;
    let resp = reqwest::get(format!("{}/api/bigquery", app)).await.unwrap();

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(!message.is_empty());
    assert!(message.contains("E2E_TOKEN_MISSING"));

    // The warehouse was never touched.
    assert_eq!(mock.query_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_query_is_an_error_not_an_empty_result() {
    let (gcp, mock) = spawn_mock_gcp().await;
    std::env::set_var("E2E_TOKEN_BADSQL", "subject-jwt");

    let mut config = app_config(&gcp, AuthMode::Federated, "E2E_TOKEN_BADSQL");
    config.bigquery.query_sql = "SELECT * FROM `test.book LIMIT 1".into();

    let app = spawn_app(config).await;
    let resp = reqwest::get(format!("{}/api/bigquery", app)).await.unwrap();

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unbalanced"));
    assert!(body.get("data").is_none());
    assert_eq!(mock.query_calls.load(Ordering::SeqCst), 0);

    std::env::remove_var("E2E_TOKEN_BADSQL");
}

#[tokio::test]
async fn ambient_mode_uses_default_credentials() {
    let (gcp, mock) = spawn_mock_gcp().await;
    // The env access token is the first rung of the ambient chain.
    std::env::set_var("GOOGLE_OAUTH_ACCESS_TOKEN", "ambient-token");

    let app = spawn_app(app_config(&gcp, AuthMode::Ambient, "unused")).await;
    let resp = reqwest::get(format!("{}/api/bigquery", app)).await.unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        mock.last_query_bearer.lock().unwrap().as_deref(),
        Some("Bearer ambient-token")
    );
    // No federated exchange happened.
    assert_eq!(mock.sts_calls.load(Ordering::SeqCst), 0);

    std::env::remove_var("GOOGLE_OAUTH_ACCESS_TOKEN");
}

#[tokio::test]
async fn concurrent_requests_resolve_credentials_independently() {
    let (gcp, mock) = spawn_mock_gcp().await;
    std::env::set_var("E2E_TOKEN_CONC", "subject-jwt");

    let app = spawn_app(app_config(&gcp, AuthMode::Federated, "E2E_TOKEN_CONC")).await;
    let url = format!("{}/api/bigquery", app);

    let (a, b) = tokio::join!(reqwest::get(url.clone()), reqwest::get(url.clone()));
    assert_eq!(a.unwrap().status(), 200);
    assert_eq!(b.unwrap().status(), 200);

    // Each request ran its own exchange — no cross-request credential reuse.
    assert_eq!(mock.sts_calls.load(Ordering::SeqCst), 2);

    std::env::remove_var("E2E_TOKEN_CONC");
}

#[tokio::test]
async fn health_reports_auth_mode() {
    let (gcp, _mock) = spawn_mock_gcp().await;
    let app = spawn_app(app_config(&gcp, AuthMode::Federated, "unused")).await;

    let resp = reqwest::get(format!("{}/health", app)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["auth_mode"], "federated");
}
