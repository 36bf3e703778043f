use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AuthError;

/// OAuth scope granting read/query access to BigQuery.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Refresh tokens this many seconds before their reported expiry.
const EXPIRY_SAFETY_WINDOW_SECS: i64 = 300;

/// A bearer access token with its expiry instant.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Token expiring `expires_in_secs` from now.
    pub fn new(token: String, expires_in_secs: i64) -> Self {
        Self {
            token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_secs),
        }
    }

    /// Token with an absolute expiry instant.
    pub fn with_expiry(token: String, expires_at: DateTime<Utc>) -> Self {
        Self { token, expires_at }
    }

    /// Still valid with the safety window applied.
    pub fn is_fresh(&self) -> bool {
        self.expires_at.timestamp() - EXPIRY_SAFETY_WINDOW_SECS > Utc::now().timestamp()
    }
}

/// Produces bearer tokens authorizing requests against Google APIs.
///
/// Implementations are lazy: constructing a provider performs no I/O, the
/// first `token()` call triggers whatever network round trips the credential
/// kind requires.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<AccessToken, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_inside_safety_window() {
        let tok = AccessToken::new("t".into(), 3600);
        assert!(tok.is_fresh());

        // Expires within the safety window — treated as stale.
        let tok = AccessToken::new("t".into(), 60);
        assert!(!tok.is_fresh());

        let tok = AccessToken::new("t".into(), -10);
        assert!(!tok.is_fresh());
    }
}
