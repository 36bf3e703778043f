//! OpenAPI documentation aggregator.
//!
//! Collects the `#[utoipa::path]`-annotated handlers and `ToSchema`-derived
//! types into a single OpenAPI 3.1 spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "fedquery API",
        version = "0.1.0",
        description = "BigQuery query service authenticated via workload identity federation.",
    ),
    tags(
        (name = "Health", description = "Server liveness and credential mode"),
        (name = "BigQuery", description = "Configured query execution against BigQuery"),
    ),
    paths(
        crate::api::health::health,
        crate::api::warehouse::bigquery_query,
    )
)]
pub struct ApiDoc;
