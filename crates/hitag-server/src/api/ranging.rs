//! Region and ranging API endpoints.
//!
//! These are the inputs from the radio layer: region entry and exit, and
//! ranging ticks carrying the beacons seen in one ranging cycle.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use hitag_core::{PresenceEvent, RawObservation, RegionStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the regions router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_regions))
        .route("/{region_id}/enter", post(enter_region))
        .route("/{region_id}/exit", post(exit_region))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Result of a region entry or exit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "region": "0000beef-6275-7962-7564-647966656500",
    "ranging": true
}))]
pub struct RegionEventResponse {
    /// Region the event was for.
    pub region: Uuid,

    /// Whether the region is ranged after the event.
    pub ranging: bool,
}

/// One ranging cycle.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "region": "0000beef-6275-7962-7564-647966656500",
    "observations": [
        {"major": 26, "minor": 43, "rssi": -52},
        {"major": 1, "minor": 2, "rssi": -70}
    ]
}))]
pub struct RangingTickRequest {
    /// Region the beacons were ranged in.
    pub region: Uuid,

    /// Beacons seen in this cycle. May be empty.
    #[serde(default)]
    pub observations: Vec<RawObservation>,
}

/// Transitions caused by a ranging cycle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RangingTickResponse {
    /// State changes, demotions first.
    pub events: Vec<PresenceEvent>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List monitored regions.
#[utoipa::path(
    get,
    path = "/api/regions",
    tag = "ranging",
    operation_id = "listRegions",
    summary = "List monitored regions",
    responses(
        (status = 200, description = "Monitored regions", body = Vec<RegionStatus>)
    )
)]
pub async fn list_regions(State(state): State<SharedState>) -> Json<Vec<RegionStatus>> {
    Json(state.runtime.regions().await)
}

/// Report entry into a region.
#[utoipa::path(
    post,
    path = "/api/regions/{region_id}/enter",
    tag = "ranging",
    operation_id = "enterRegion",
    summary = "Report region entry",
    description = "Entering any monitored region starts ranging on every \
        monitored region.",
    params(("region_id" = Uuid, Path, description = "Region UUID")),
    responses(
        (status = 200, description = "Ranging started", body = RegionEventResponse),
        (status = 404, description = "Region is not monitored", body = crate::api::ErrorResponse)
    )
)]
pub async fn enter_region(
    State(state): State<SharedState>,
    Path(region_id): Path<Uuid>,
) -> ApiResult<Json<RegionEventResponse>> {
    state.runtime.enter_region(region_id).await?;
    Ok(Json(RegionEventResponse {
        region: region_id,
        ranging: true,
    }))
}

/// Report exit from a region.
#[utoipa::path(
    post,
    path = "/api/regions/{region_id}/exit",
    tag = "ranging",
    operation_id = "exitRegion",
    summary = "Report region exit",
    description = "Stops ranging the exited region only.",
    params(("region_id" = Uuid, Path, description = "Region UUID")),
    responses(
        (status = 200, description = "Ranging stopped", body = RegionEventResponse)
    )
)]
pub async fn exit_region(
    State(state): State<SharedState>,
    Path(region_id): Path<Uuid>,
) -> Json<RegionEventResponse> {
    state.runtime.exit_region(region_id).await;
    Json(RegionEventResponse {
        region: region_id,
        ranging: false,
    })
}

/// Deliver one ranging cycle.
#[utoipa::path(
    post,
    path = "/api/ranging",
    tag = "ranging",
    operation_id = "rangingTick",
    summary = "Deliver a ranging tick",
    description = "Applies one ranging cycle to the presence tracker. Ticks for \
        regions that are not being ranged are ignored and produce no events.",
    request_body = RangingTickRequest,
    responses(
        (status = 200, description = "Tick applied", body = RangingTickResponse)
    )
)]
pub async fn ranging_tick(
    State(state): State<SharedState>,
    Json(request): Json<RangingTickRequest>,
) -> Json<RangingTickResponse> {
    let events = state
        .runtime
        .on_ranging_tick(request.region, request.observations)
        .await;
    Json(RangingTickResponse { events })
}
