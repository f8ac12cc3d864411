//! OpenAPI specification generation for the hitag API.
//!
//! The document is served at `/api/openapi.json`, rendered by Swagger UI at
//! `/swagger-ui`, and written to disk by the `gen-openapi` binary.

use axum::Json;
use hitag_core::{
    AuthPhase, AuthStatus, HealthResponse, PresenceEvent, PresenceSnapshot, RawObservation,
    RegionStatus, Tag, TagPresence, TagState,
};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::ranging::{RangingTickRequest, RangingTickResponse, RegionEventResponse};
use super::session::{RestoredToken, SetSecretRequest};
use super::upload::FlushResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for hitag.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "hitag API",
        version = "0.1.0",
        description = r#"
# hitag API

hitagd tracks which product tags are near the device and keeps the backend informed.

## Overview

1. **Ranging**: The radio layer reports region entry/exit and delivers ranging ticks.
2. **Presence**: Tags move from `unknown` to `active` when they are the strongest
   beacon in a tick, and from `active` to `passive` after 10 seconds unseen.
3. **Session**: The host installs a long-lived access secret; session tokens are
   exchanged and refreshed automatically, one exchange at a time.
4. **Upload**: Every state change is queued as a scan record and uploaded in batches.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local hitag daemon")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "ranging", description = "Region events and ranging ticks from the radio layer"),
        (name = "presence", description = "Active and passive tags in the tracking session"),
        (name = "session", description = "Backend access secret and credential status"),
        (name = "upload", description = "Scan-record upload to the backend")
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Ranging endpoints
        super::ranging::list_regions,
        super::ranging::enter_region,
        super::ranging::exit_region,
        super::ranging::ranging_tick,
        // Presence endpoints
        super::presence::get_presence,
        super::presence::get_tag,
        super::presence::end_session,
        // Session endpoints
        super::session::get_session,
        super::session::set_secret,
        super::session::clear_session,
        // Upload endpoints
        super::upload::flush_uploads,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            // Ranging types
            RawObservation,
            RegionStatus,
            RegionEventResponse,
            RangingTickRequest,
            RangingTickResponse,
            // Presence types
            TagState,
            Tag,
            PresenceEvent,
            PresenceSnapshot,
            TagPresence,
            // Session types
            AuthPhase,
            AuthStatus,
            SetSecretRequest,
            RestoredToken,
            // Upload types
            FlushResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "hitag API");
        assert!(spec.paths.paths.contains_key("/api/ranging"));
        assert!(spec.paths.paths.contains_key("/api/session/secret"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"hitag API\""));
    }
}
