pub mod config;
pub mod error;

pub use config::{load_dotenv, ServerConfig};
pub use error::ConfigError;
