//! Domain-focused API endpoint modules.
//!
//! Each sub-module owns a single responsibility area.
//! Shared response types live here in mod.rs.

pub mod doc;
mod health;
mod warehouse;

use serde::Serialize;

// ── Shared types ─────────────────────────────────────────────────

/// Uniform error payload: callers always receive `{"error": "..."}`.
#[derive(Serialize, utoipa::ToSchema)]
pub struct QueryErrorResponse {
    pub error: String,
}

// ── Re-exports ───────────────────────────────────────────────────

pub use health::health;
pub use warehouse::{bigquery_query, QueryDataResponse};
