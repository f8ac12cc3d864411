//! Scan-record upload endpoint.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the upload router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/flush", post(flush_uploads))
}

/// Outcome of a flush.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "uploaded": 12, "pending": 0 }))]
pub struct FlushResponse {
    /// Records accepted by the backend.
    pub uploaded: usize,

    /// Records still queued.
    pub pending: usize,
}

/// Upload queued scan records now.
#[utoipa::path(
    post,
    path = "/api/upload/flush",
    tag = "upload",
    operation_id = "flushUploads",
    summary = "Upload queued scan records",
    description = "Sends every queued scan record to the backend in batches. A \
        failed batch stays queued for the next flush.",
    responses(
        (status = 200, description = "Queue flushed", body = FlushResponse),
        (status = 401, description = "No usable credential", body = crate::api::ErrorResponse),
        (status = 502, description = "Backend rejected the upload", body = crate::api::ErrorResponse),
        (status = 503, description = "Backend unreachable", body = crate::api::ErrorResponse)
    )
)]
pub async fn flush_uploads(State(state): State<SharedState>) -> ApiResult<Json<FlushResponse>> {
    let uploaded = state.runtime.flush_uploads().await?;
    Ok(Json(FlushResponse {
        uploaded,
        pending: state.runtime.uploader().pending(),
    }))
}
