use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use fedquery_core::config::{active_profile, profiled_env_opt, profiled_env_or};
use fedquery_core::ConfigError;

/// Default STS token exchange endpoint.
const DEFAULT_STS_ENDPOINT: &str = "https://sts.googleapis.com/v1/token";

/// Default IAM credentials service (service-account impersonation).
const DEFAULT_IAM_CREDENTIALS_ENDPOINT: &str = "https://iamcredentials.googleapis.com";

/// Env var holding the platform OIDC token when no other source is configured.
const DEFAULT_SUBJECT_TOKEN_ENV: &str = "VERCEL_OIDC_TOKEN";

/// How credentials are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Workload-identity federation: exchange a platform identity token for
    /// impersonated service-account credentials.
    Federated,
    /// Application default credentials of the host environment.
    Ambient,
}

/// Where the subject token (platform identity token) comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SubjectTokenSourceConfig {
    /// Read from the named environment variable on each use.
    EnvVar(String),
    /// Read from a file (e.g. a projected token volume).
    File(PathBuf),
    /// Fetch from an HTTP endpoint.
    Url(String),
}

/// Workload-identity-federation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedConfig {
    /// Numeric GCP project number (not the project id).
    pub project_number: String,
    pub pool_id: String,
    pub provider_id: String,
    /// Service account to impersonate after the token exchange.
    pub service_account_email: String,
    pub subject_token: SubjectTokenSourceConfig,
    pub sts_endpoint: String,
    pub iam_credentials_endpoint: String,
}

impl FederatedConfig {
    /// Audience identifying the workload identity pool provider.
    pub fn audience(&self) -> String {
        format!(
            "//iam.googleapis.com/projects/{}/locations/global/workloadIdentityPools/{}/providers/{}",
            self.project_number, self.pool_id, self.provider_id
        )
    }

    /// `generateAccessToken` URL for the target service account.
    pub fn impersonation_url(&self) -> String {
        format!(
            "{}/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            self.iam_credentials_endpoint, self.service_account_email
        )
    }
}

/// Credential resolver configuration, validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Present only in federated mode. Ambient mode never reads the
    /// federation env keys.
    pub federated: Option<FederatedConfig>,
}

impl AuthConfig {
    /// Build and validate config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_profiled(&active_profile())
    }

    /// Build and validate config for a specific named profile.
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        let mode = match profiled_env_or(p, "AUTH_MODE", "federated").as_str() {
            "federated" => AuthMode::Federated,
            "ambient" => AuthMode::Ambient,
            other => {
                return Err(ConfigError::Invalid {
                    key: "AUTH_MODE",
                    reason: format!("expected \"federated\" or \"ambient\", got \"{}\"", other),
                })
            }
        };

        let federated = match mode {
            AuthMode::Federated => Some(FederatedConfig::from_env_profiled(p)?),
            AuthMode::Ambient => None,
        };

        Ok(Self { mode, federated })
    }
}

impl FederatedConfig {
    fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        let project_number = profiled_env_opt(p, "GCP_PROJECT_NUMBER")
            .ok_or(ConfigError::Missing("GCP_PROJECT_NUMBER"))?;
        if !project_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                key: "GCP_PROJECT_NUMBER",
                reason: format!("must be numeric, got \"{}\"", project_number),
            });
        }

        let pool_id = profiled_env_opt(p, "GCP_WORKLOAD_IDENTITY_POOL_ID")
            .ok_or(ConfigError::Missing("GCP_WORKLOAD_IDENTITY_POOL_ID"))?;
        let provider_id = profiled_env_opt(p, "GCP_WORKLOAD_IDENTITY_POOL_PROVIDER_ID")
            .ok_or(ConfigError::Missing("GCP_WORKLOAD_IDENTITY_POOL_PROVIDER_ID"))?;

        let service_account_email = profiled_env_opt(p, "GCP_SERVICE_ACCOUNT_EMAIL")
            .ok_or(ConfigError::Missing("GCP_SERVICE_ACCOUNT_EMAIL"))?;
        if !service_account_email.contains('@') || !service_account_email.contains('.') {
            return Err(ConfigError::Invalid {
                key: "GCP_SERVICE_ACCOUNT_EMAIL",
                reason: format!("\"{}\" is not an email address", service_account_email),
            });
        }

        // First configured source wins: file, then URL, then env var.
        let subject_token = if let Some(path) = profiled_env_opt(p, "SUBJECT_TOKEN_FILE") {
            SubjectTokenSourceConfig::File(PathBuf::from(path))
        } else if let Some(url) = profiled_env_opt(p, "SUBJECT_TOKEN_URL") {
            SubjectTokenSourceConfig::Url(url)
        } else {
            SubjectTokenSourceConfig::EnvVar(profiled_env_or(
                p,
                "SUBJECT_TOKEN_ENV",
                DEFAULT_SUBJECT_TOKEN_ENV,
            ))
        };

        Ok(Self {
            project_number,
            pool_id,
            provider_id,
            service_account_email,
            subject_token,
            sts_endpoint: profiled_env_or(p, "STS_ENDPOINT", DEFAULT_STS_ENDPOINT),
            iam_credentials_endpoint: profiled_env_or(
                p,
                "IAM_CREDENTIALS_ENDPOINT",
                DEFAULT_IAM_CREDENTIALS_ENDPOINT,
            ),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
