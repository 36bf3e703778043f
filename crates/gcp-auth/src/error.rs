use thiserror::Error;

use fedquery_core::ConfigError;

/// Errors that can occur while resolving or refreshing credentials.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Required auth configuration is absent or malformed.
    #[error("Auth configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The subject-token supplier could not produce an identity token.
    #[error("Subject token unavailable: {0}")]
    SubjectToken(String),

    /// The STS token exchange was rejected.
    #[error("Token exchange rejected (HTTP {status}): {message}")]
    TokenExchange { status: u16, message: String },

    /// The service-account impersonation call was rejected.
    #[error("Impersonation of {email} rejected (HTTP {status}): {message}")]
    Impersonation {
        email: String,
        status: u16,
        message: String,
    },

    /// Default credential discovery found nothing usable.
    #[error("No ambient credentials found: {0}")]
    AdcUnavailable(String),

    /// A service-account key could not be read or parsed.
    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    /// Transport-level failure talking to an auth endpoint.
    #[error("HTTP error: {0}")]
    Http(String),

    /// An auth endpoint returned a body we could not interpret.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Extract a human-readable message from an auth endpoint error response.
///
/// Google endpoints return either `{"error": {"message": ...}}` or OAuth-style
/// `{"error": ..., "error_description": ...}`. Falls back to the raw body.
pub(crate) async fn response_error_message(resp: reqwest::Response) -> String {
    let body = resp.text().await.unwrap_or_default();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(desc) = value.get("error_description").and_then(|d| d.as_str()) {
            return desc.to_string();
        }
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            return err.to_string();
        }
    }
    let mut message = body.trim().to_string();
    if message.is_empty() {
        message = "(empty response body)".to_string();
    } else if message.len() > 512 {
        message.truncate(512);
    }
    message
}
