pub mod adc;
pub mod config;
pub mod error;
pub mod external_account;
pub mod resolver;
pub mod service_account;
pub mod subject_token;
pub mod token;

pub use adc::AdcCredentials;
pub use config::{AuthConfig, AuthMode, FederatedConfig, SubjectTokenSourceConfig};
pub use error::AuthError;
pub use external_account::ExternalAccountCredentials;
pub use resolver::{resolve, Credentials};
pub use service_account::{ServiceAccountCredentials, ServiceAccountKey};
pub use subject_token::{SubjectTokenSource, SubjectTokenSupplier};
pub use token::{AccessToken, TokenProvider, BIGQUERY_SCOPE};
