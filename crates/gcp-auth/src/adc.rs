//! Application default credentials for ambient mode.
//!
//! Resolution order:
//! 1) `GOOGLE_OAUTH_ACCESS_TOKEN` env var
//! 2) Service-account JSON via `GOOGLE_APPLICATION_CREDENTIALS`
//! 3) GCE/GKE metadata server token

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AuthError;
use crate::service_account::{ServiceAccountCredentials, ServiceAccountKey};
use crate::token::{AccessToken, TokenProvider};

const METADATA_URL_DEFAULT: &str =
    "http://169.254.169.254/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_HEADER: &str = "Metadata-Flavor";
const METADATA_HEADER_VALUE: &str = "Google";

/// Tokens from the env var carry no expiry info; assume short-lived.
const ENV_TOKEN_LIFETIME_SECS: i64 = 600;

pub struct AdcCredentials {
    http: reqwest::Client,
    scopes: Vec<String>,
    cache: Mutex<Option<AccessToken>>,
}

impl AdcCredentials {
    pub fn new(http: reqwest::Client, scopes: Vec<String>) -> Self {
        Self {
            http,
            scopes,
            cache: Mutex::new(None),
        }
    }

    fn try_env(&self) -> Option<AccessToken> {
        std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(|t| AccessToken::new(t, ENV_TOKEN_LIFETIME_SECS))
    }

    async fn try_service_account(&self) -> Result<Option<AccessToken>, AuthError> {
        let Some(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
            .ok()
            .filter(|p| !p.is_empty())
        else {
            return Ok(None);
        };

        // The var was set explicitly — a broken key file is an error, not a
        // fall-through.
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            AuthError::InvalidKey(format!(
                "failed to read GOOGLE_APPLICATION_CREDENTIALS file {}: {}",
                path, e
            ))
        })?;
        let key = ServiceAccountKey::from_json(&content)?;

        debug!(email = %key.client_email, "Using service-account key for ambient credentials");
        let creds = ServiceAccountCredentials::new(key, self.scopes.clone(), self.http.clone());
        Ok(Some(creds.fetch_token().await?))
    }

    async fn try_metadata(&self) -> Result<Option<AccessToken>, AuthError> {
        // Overridable so tests can point at a local endpoint.
        let url =
            std::env::var("ADC_METADATA_URL").unwrap_or_else(|_| METADATA_URL_DEFAULT.to_string());

        let resp = match self
            .http
            .get(&url)
            .header(METADATA_HEADER, METADATA_HEADER_VALUE)
            .send()
            .await
        {
            Ok(resp) => resp,
            // No metadata server reachable — not an error, just not this rung.
            Err(_) => return Ok(None),
        };
        if !resp.status().is_success() {
            return Ok(None);
        }

        #[derive(Deserialize)]
        struct MetadataToken {
            access_token: String,
            expires_in: i64,
        }

        let md: MetadataToken = resp
            .json()
            .await
            .map_err(|e| AuthError::Parse(format!("invalid metadata token response: {}", e)))?;

        Ok(Some(AccessToken::new(md.access_token, md.expires_in)))
    }

    async fn fetch(&self) -> Result<AccessToken, AuthError> {
        if let Some(tok) = self.try_env() {
            debug!("Ambient credentials from GOOGLE_OAUTH_ACCESS_TOKEN");
            return Ok(tok);
        }
        if let Some(tok) = self.try_service_account().await? {
            return Ok(tok);
        }
        if let Some(tok) = self.try_metadata().await? {
            debug!("Ambient credentials from metadata server");
            return Ok(tok);
        }
        Err(AuthError::AdcUnavailable(
            "no env token, no service account file, no metadata token".into(),
        ))
    }
}

#[async_trait]
impl TokenProvider for AdcCredentials {
    async fn token(&self) -> Result<AccessToken, AuthError> {
        let mut cached = self.cache.lock().await;
        if let Some(tok) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(tok.clone());
        }
        let token = self.fetch().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}
