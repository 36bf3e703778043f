use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::SubjectTokenSourceConfig;
use crate::error::AuthError;

/// Supplies the platform identity token exchanged for cloud credentials.
///
/// Called once per credential refresh; the token is requested fresh each
/// time and never stored.
#[async_trait]
pub trait SubjectTokenSupplier: Send + Sync {
    async fn subject_token(&self) -> Result<String, AuthError>;
}

/// Built-in subject-token sources.
pub enum SubjectTokenSource {
    EnvVar { var: String },
    File { path: PathBuf },
    Url { url: String, http: reqwest::Client },
}

impl SubjectTokenSource {
    pub fn from_config(cfg: &SubjectTokenSourceConfig, http: reqwest::Client) -> Self {
        match cfg {
            SubjectTokenSourceConfig::EnvVar(var) => Self::EnvVar { var: var.clone() },
            SubjectTokenSourceConfig::File(path) => Self::File { path: path.clone() },
            SubjectTokenSourceConfig::Url(url) => Self::Url {
                url: url.clone(),
                http,
            },
        }
    }
}

#[async_trait]
impl SubjectTokenSupplier for SubjectTokenSource {
    async fn subject_token(&self) -> Result<String, AuthError> {
        match self {
            Self::EnvVar { var } => match std::env::var(var) {
                Ok(tok) if !tok.is_empty() => Ok(tok),
                _ => Err(AuthError::SubjectToken(format!(
                    "env var {} is not set",
                    var
                ))),
            },
            Self::File { path } => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    AuthError::SubjectToken(format!("failed to read {}: {}", path.display(), e))
                })?;
                let token = content.trim().to_string();
                if token.is_empty() {
                    return Err(AuthError::SubjectToken(format!(
                        "{} is empty",
                        path.display()
                    )));
                }
                Ok(token)
            }
            Self::Url { url, http } => {
                let resp = http.get(url).send().await.map_err(|e| {
                    AuthError::SubjectToken(format!("token endpoint request failed: {}", e))
                })?;
                if !resp.status().is_success() {
                    return Err(AuthError::SubjectToken(format!(
                        "token endpoint returned HTTP {}",
                        resp.status().as_u16()
                    )));
                }
                let body = resp.text().await.map_err(|e| {
                    AuthError::SubjectToken(format!("failed to read token response: {}", e))
                })?;
                // Endpoints return either a bare token or {"token": "..."}.
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
                    if let Some(tok) = value.get("token").and_then(|t| t.as_str()) {
                        return Ok(tok.to_string());
                    }
                }
                let token = body.trim().to_string();
                if token.is_empty() {
                    return Err(AuthError::SubjectToken("token endpoint returned an empty body".into()));
                }
                Ok(token)
            }
        }
    }
}
