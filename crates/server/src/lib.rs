pub mod api;
pub mod app_config;
pub mod router;
pub mod state;

pub use app_config::AppConfig;
pub use router::build_router;
pub use state::AppState;
