//! Backend session endpoints.
//!
//! The host supplies the long-lived access secret here. Session tokens are
//! never returned; only their issue time is visible through the status.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hitag_core::{AuthStatus, SessionToken};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the session router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_session).delete(clear_session))
        .route("/secret", post(set_secret))
}

/// A previously issued token to resume with.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RestoredToken {
    /// Token value as issued by the backend.
    pub value: String,

    /// When the backend issued it.
    pub issued_at: DateTime<Utc>,
}

/// Request body for installing an access secret.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "secret": "hitag-access-secret" }))]
pub struct SetSecretRequest {
    /// Long-lived access secret.
    #[schema(min_length = 1)]
    pub secret: String,

    /// Optional persisted token, skipping the first exchange.
    #[serde(default)]
    pub token: Option<RestoredToken>,
}

/// Get credential status.
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "session",
    operation_id = "getSession",
    summary = "Get credential status",
    description = "Reports whether a secret is installed, whether a refresh is \
        running, and whether the credential has been revoked.",
    responses(
        (status = 200, description = "Credential status", body = AuthStatus)
    )
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<AuthStatus> {
    Json(state.runtime.auth().status())
}

/// Install an access secret.
#[utoipa::path(
    post,
    path = "/api/session/secret",
    tag = "session",
    operation_id = "setSecret",
    summary = "Install an access secret",
    description = "Replaces the access secret and clears any revocation. The next \
        backend request exchanges it for a session token unless a token is supplied.",
    request_body = SetSecretRequest,
    responses(
        (status = 200, description = "Secret installed", body = AuthStatus),
        (status = 400, description = "Empty secret", body = crate::api::ErrorResponse)
    )
)]
pub async fn set_secret(
    State(state): State<SharedState>,
    Json(request): Json<SetSecretRequest>,
) -> ApiResult<Json<AuthStatus>> {
    if request.secret.trim().is_empty() {
        return Err(ApiError::BadRequest {
            error_code: "empty_secret".to_string(),
            message: "Access secret must not be empty".to_string(),
        });
    }

    let auth = state.runtime.auth();
    match request.token {
        Some(token) => {
            auth.restore(request.secret, SessionToken::new(token.value, token.issued_at));
            info!("Access secret installed with restored token");
        }
        None => {
            auth.set_secret(request.secret);
            info!("Access secret installed");
        }
    }
    Ok(Json(auth.status()))
}

/// Forget the access secret.
#[utoipa::path(
    delete,
    path = "/api/session",
    tag = "session",
    operation_id = "clearSession",
    summary = "Forget the access secret",
    description = "Removes the secret and token. Backend requests fail until a \
        new secret is installed.",
    responses(
        (status = 200, description = "Secret removed", body = AuthStatus)
    )
)]
pub async fn clear_session(State(state): State<SharedState>) -> Json<AuthStatus> {
    let auth = state.runtime.auth();
    auth.clear_secret();
    Json(auth.status())
}
