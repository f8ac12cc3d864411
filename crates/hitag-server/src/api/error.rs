//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hitag_core::HitagError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 401 Unauthorized - No usable backend credential.
    Unauthorized {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details (not exposed to client in production).
        details: Option<String>,
    },

    /// 502/503/504 - The backend failed or could not be reached.
    Upstream {
        /// Status to answer with.
        status: StatusCode,
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "credential_revoked",
    "message": "Access credential revoked. Supply a new access secret to continue.",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "region_not_monitored").
    #[schema(example = "credential_revoked")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Access credential revoked. Supply a new access secret to continue.")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    const fn new(error: String, message: String) -> Self {
        Self {
            error,
            message,
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::BadRequest { error_code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(error_code, message),
            ),

            Self::Unauthorized { error_code, message } => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new(error_code, message),
            ),

            Self::NotFound { error_code, message } => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(error_code, message),
            ),

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }

            Self::Upstream {
                status,
                error_code,
                message,
            } => (status, ErrorResponse::new(error_code, message)),
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::Unauthorized { message, .. } => write!(f, "Unauthorized: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
            Self::Upstream {
                status, message, ..
            } => write!(f, "Upstream {status}: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from hitag_core errors.
impl From<HitagError> for ApiError {
    fn from(err: HitagError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();
        let status =
            StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if err.is_auth_error() && status == StatusCode::UNAUTHORIZED {
            return Self::Unauthorized {
                error_code,
                message,
            };
        }

        match status {
            StatusCode::NOT_FOUND => Self::NotFound {
                error_code,
                message,
            },
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Self::Upstream {
                    status,
                    error_code,
                    message,
                }
            }
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<hitag_core::PipelineError> for ApiError {
    fn from(err: hitag_core::PipelineError) -> Self {
        Self::from(HitagError::from(err))
    }
}

impl From<hitag_core::AuthError> for ApiError {
    fn from(err: hitag_core::AuthError) -> Self {
        Self::from(HitagError::from(err))
    }
}
