use crate::app_config::AppConfig;

/// Shared, immutable application state.
///
/// The reqwest client is a connection pool; credentials are never stored
/// here — each request resolves its own.
pub struct AppState {
    pub config: AppConfig,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}
