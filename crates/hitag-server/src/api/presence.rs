//! Presence API endpoints.
//!
//! Read-only views over the tracking session, plus an endpoint to end it.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use hitag_core::{PresenceSnapshot, TagId, TagPresence};

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the presence router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_presence).delete(end_session))
        .route("/{tag_id}", get(get_tag))
}

/// Get the current tracking session.
#[utoipa::path(
    get,
    path = "/api/presence",
    tag = "presence",
    operation_id = "getPresence",
    summary = "Get active and passive tags",
    description = "Returns active tags ordered by signal strength, passive tags \
        ordered by last sighting, the regions being ranged and the number of scan \
        records waiting for upload.",
    responses(
        (status = 200, description = "Session snapshot", body = PresenceSnapshot)
    )
)]
pub async fn get_presence(State(state): State<SharedState>) -> Json<PresenceSnapshot> {
    Json(state.runtime.snapshot().await)
}

/// Get the state of one tag.
#[utoipa::path(
    get,
    path = "/api/presence/{tag_id}",
    tag = "presence",
    operation_id = "getTag",
    summary = "Get one tag's state",
    description = "Returns `unknown` for tags never seen in this session.",
    params(
        ("tag_id" = String, Path, description = "Uppercase hex tag id", example = "1A2B")
    ),
    responses(
        (status = 200, description = "Tag state", body = TagPresence),
        (status = 400, description = "Malformed tag id", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_tag(
    State(state): State<SharedState>,
    Path(tag_id): Path<String>,
) -> ApiResult<Json<TagPresence>> {
    let id = TagId::parse(&tag_id).ok_or_else(|| ApiError::BadRequest {
        error_code: "invalid_tag_id".to_string(),
        message: format!("'{tag_id}' is not an uppercase hexadecimal tag id"),
    })?;
    Ok(Json(state.runtime.tag(&id).await))
}

/// End the tracking session.
#[utoipa::path(
    delete,
    path = "/api/presence",
    tag = "presence",
    operation_id = "endSession",
    summary = "End the tracking session",
    description = "Stops ranging and forgets every tag. Queued scan records are \
        kept and uploaded by the next flush.",
    responses(
        (status = 200, description = "Session after reset", body = PresenceSnapshot)
    )
)]
pub async fn end_session(State(state): State<SharedState>) -> Json<PresenceSnapshot> {
    state.runtime.end_session().await;
    Json(state.runtime.snapshot().await)
}
