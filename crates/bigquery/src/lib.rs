pub mod client;
pub mod config;
pub mod params;
pub mod result;
pub mod rows;

pub use client::{BigQueryClient, BigQueryError};
pub use config::BigQueryConfig;
pub use params::{ParameterValue, QueryParameter, QueryRequest, ValidationError};
pub use result::{QueryColumn, QueryMetadata, QueryResultSet};
pub use rows::{TableFieldSchema, TableSchema};
