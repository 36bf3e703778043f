use async_trait::async_trait;
use tracing::debug;

use fedquery_core::ConfigError;

use crate::adc::AdcCredentials;
use crate::config::{AuthConfig, AuthMode};
use crate::error::AuthError;
use crate::external_account::ExternalAccountCredentials;
use crate::token::{AccessToken, TokenProvider, BIGQUERY_SCOPE};

/// Resolved credentials for one request.
pub enum Credentials {
    External(ExternalAccountCredentials),
    Ambient(AdcCredentials),
}

/// Build a credential provider for the configured mode.
///
/// Construction is lazy — no network round trips happen until the first
/// `token()` call. Every caller gets an independent provider; nothing is
/// shared between resolutions.
pub fn resolve(cfg: &AuthConfig, http: &reqwest::Client) -> Result<Credentials, AuthError> {
    match cfg.mode {
        AuthMode::Federated => {
            let fed = cfg
                .federated
                .as_ref()
                .ok_or(AuthError::Config(ConfigError::Missing(
                    "federated auth configuration",
                )))?;
            debug!(audience = %fed.audience(), "Resolving federated credentials");
            Ok(Credentials::External(ExternalAccountCredentials::from_config(
                fed,
                http.clone(),
            )))
        }
        AuthMode::Ambient => {
            debug!("Resolving ambient credentials");
            Ok(Credentials::Ambient(AdcCredentials::new(
                http.clone(),
                vec![BIGQUERY_SCOPE.to_string()],
            )))
        }
    }
}

#[async_trait]
impl TokenProvider for Credentials {
    async fn token(&self) -> Result<AccessToken, AuthError> {
        match self {
            Self::External(creds) => creds.token().await,
            Self::Ambient(creds) => creds.token().await,
        }
    }
}
