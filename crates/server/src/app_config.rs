//! Application configuration loading.
//!
//! Assembles the full config from environment variables in one place and
//! rejects incomplete configuration at startup rather than on first request.

use serde::{Deserialize, Serialize};
use tracing::info;

use fedquery_bigquery::BigQueryConfig;
use fedquery_core::config::active_profile;
use fedquery_core::{ConfigError, ServerConfig};
use fedquery_gcp_auth::{AuthConfig, AuthMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub bigquery: BigQueryConfig,
}

impl AppConfig {
    /// Load `.env` and build validated config from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        fedquery_core::load_dotenv();
        Self::from_env()
    }

    /// Build validated config from environment variables (call
    /// `load_dotenv()` first). Profile is read from `FEDQUERY_PROFILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = active_profile();
        Ok(Self {
            server: ServerConfig::from_env_profiled(&profile),
            auth: AuthConfig::from_env_profiled(&profile)?,
            bigquery: BigQueryConfig::from_env_profiled(&profile)?,
            profile,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    pub fn auth_mode_label(&self) -> &'static str {
        match self.auth.mode {
            AuthMode::Federated => "federated",
            AuthMode::Ambient => "ambient",
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        info!("Config loaded (profile: {}):", self.profile_label());
        info!(
            "  server:    {}:{}",
            self.server.host, self.server.port
        );
        info!("  auth:      mode={}", self.auth_mode_label());
        if let Some(fed) = &self.auth.federated {
            info!("  federated: audience={}", fed.audience());
            info!("  federated: service_account={}", fed.service_account_email);
        }
        info!(
            "  bigquery:  project={}, timeout={}s, max_rows={}",
            self.bigquery.project_id, self.bigquery.timeout_seconds, self.bigquery.max_rows
        );
        info!("  bigquery:  query={}", self.bigquery.query_sql);
    }
}
