//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `ranging` - Region entry/exit and ranging ticks
//! - `presence` - Tracking session views
//! - `session` - Backend access secret and credential status
//! - `upload` - Scan-record upload
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod openapi;
pub mod presence;
pub mod ranging;
pub mod session;
pub mod upload;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                     - Health check
/// /swagger-ui                 - Interactive API documentation
/// /api
/// ├── /regions                - Monitored regions, entry and exit
/// ├── /ranging                - Ranging ticks
/// ├── /presence               - Active and passive tags
/// ├── /session                - Access secret and credential status
/// ├── /upload/flush           - Scan-record upload
/// └── /openapi.json           - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/regions", ranging::router())
                .route("/ranging", post(ranging::ranging_tick))
                .nest("/presence", presence::router())
                .nest("/session", session::router())
                .nest("/upload", upload::router())
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
