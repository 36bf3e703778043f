//! Workload-identity-federation credentials.
//!
//! Exchanges a platform-issued identity token for impersonated
//! service-account credentials in two round trips: the STS token exchange,
//! then `generateAccessToken` on the IAM credentials service. Construction
//! performs no I/O; the first `token()` call runs the full chain.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::FederatedConfig;
use crate::error::{response_error_message, AuthError};
use crate::subject_token::{SubjectTokenSource, SubjectTokenSupplier};
use crate::token::{AccessToken, TokenProvider, BIGQUERY_SCOPE};

/// Subject token type sent to the STS exchange.
const SUBJECT_TOKEN_TYPE_JWT: &str = "urn:ietf:params:oauth:token-type:jwt";
const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const REQUESTED_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// The intermediate STS token must carry a scope broad enough for the
/// impersonation call; the impersonated token is scoped down to BigQuery.
const STS_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

pub struct ExternalAccountCredentials {
    audience: String,
    token_url: String,
    impersonation_url: String,
    service_account_email: String,
    scopes: Vec<String>,
    supplier: Arc<dyn SubjectTokenSupplier>,
    http: reqwest::Client,
    cache: Mutex<Option<AccessToken>>,
}

impl ExternalAccountCredentials {
    /// Build federated credentials from validated config. No network I/O.
    pub fn from_config(cfg: &FederatedConfig, http: reqwest::Client) -> Self {
        let supplier = Arc::new(SubjectTokenSource::from_config(
            &cfg.subject_token,
            http.clone(),
        ));
        Self::with_supplier(cfg, http, supplier)
    }

    /// Build with a caller-provided subject-token supplier.
    pub fn with_supplier(
        cfg: &FederatedConfig,
        http: reqwest::Client,
        supplier: Arc<dyn SubjectTokenSupplier>,
    ) -> Self {
        Self {
            audience: cfg.audience(),
            token_url: cfg.sts_endpoint.clone(),
            impersonation_url: cfg.impersonation_url(),
            service_account_email: cfg.service_account_email.clone(),
            scopes: vec![BIGQUERY_SCOPE.to_string()],
            supplier,
            http,
            cache: Mutex::new(None),
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Exchange the subject token for a federated access token at the STS.
    async fn exchange(&self, subject_token: &str) -> Result<String, AuthError> {
        debug!(audience = %self.audience, "Exchanging subject token");

        let form = [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("audience", self.audience.as_str()),
            ("scope", STS_SCOPE),
            ("subject_token_type", SUBJECT_TOKEN_TYPE_JWT),
            ("requested_token_type", REQUESTED_TOKEN_TYPE),
            ("subject_token", subject_token),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Http(format!("STS request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::TokenExchange {
                status: status.as_u16(),
                message: response_error_message(resp).await,
            });
        }

        #[derive(Deserialize)]
        struct StsResponse {
            access_token: String,
        }

        let sts: StsResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Parse(format!("invalid STS response: {}", e)))?;

        Ok(sts.access_token)
    }

    /// Trade the federated token for an impersonated service-account token.
    async fn impersonate(&self, federated_token: &str) -> Result<AccessToken, AuthError> {
        debug!(email = %self.service_account_email, "Impersonating service account");

        let body = serde_json::json!({
            "scope": self.scopes,
            "lifetime": "3600s",
        });

        let resp = self
            .http
            .post(&self.impersonation_url)
            .bearer_auth(federated_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Http(format!("impersonation request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::Impersonation {
                email: self.service_account_email.clone(),
                status: status.as_u16(),
                message: response_error_message(resp).await,
            });
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ImpersonationResponse {
            access_token: String,
            expire_time: String,
        }

        let imp: ImpersonationResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Parse(format!("invalid impersonation response: {}", e)))?;

        let expires_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&imp.expire_time)
            .map_err(|e| AuthError::Parse(format!("invalid expireTime: {}", e)))?
            .with_timezone(&Utc);

        Ok(AccessToken::with_expiry(imp.access_token, expires_at))
    }

    async fn fetch(&self) -> Result<AccessToken, AuthError> {
        let subject_token = self.supplier.subject_token().await?;
        let federated_token = self.exchange(&subject_token).await?;
        let token = self.impersonate(&federated_token).await?;
        debug!(
            email = %self.service_account_email,
            expires_at = %token.expires_at,
            "Federated credentials ready"
        );
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for ExternalAccountCredentials {
    async fn token(&self) -> Result<AccessToken, AuthError> {
        // Holding the lock across the fetch serializes concurrent refreshes
        // on this instance.
        let mut cached = self.cache.lock().await;
        if let Some(tok) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(tok.clone());
        }
        let token = self.fetch().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}
