//! Unified error types for the hitag core library.
//!
//! This module provides a unified error type [`HitagError`] that covers all failure
//! modes across the hitag system. Each module also has its own specific error types
//! (`ConfigError`, `AuthError`, `TransportError`, `PipelineError`) for internal use.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Context preservation**: Wrapped errors maintain their original context
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! Presence tracking never produces errors; malformed observations are dropped.
//!
//! # Example
//!
//! ```rust
//! use hitag_core::error::{HitagError, Result};
//!
//! fn require_secret(secret: Option<&str>) -> Result<&str> {
//!     secret.ok_or(HitagError::NoSecret)
//! }
//! ```

use thiserror::Error;
use uuid::Uuid;

/// The unified error type for all hitag operations.
#[derive(Debug, Error)]
pub enum HitagError {
    // =========================================================================
    // CREDENTIAL ERRORS
    // =========================================================================
    /// No access secret has been supplied by the host.
    #[error("No access secret configured. Set one before syncing with the backend.")]
    NoSecret,

    /// The access secret was rejected and must be replaced.
    #[error("Access credential revoked. Supply a new access secret to continue.")]
    CredentialRevoked,

    /// A session token could not be obtained.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The backend rejected the request's credentials even after a refresh.
    #[error("Backend rejected the request credentials (status {0})")]
    Unauthorized(u16),

    // =========================================================================
    // BACKEND & TRANSPORT ERRORS
    // =========================================================================
    /// The backend answered with an unexpected status.
    #[error("Backend returned status {0}")]
    BackendStatus(u16),

    /// The backend could not be reached.
    #[error("Backend unreachable: {0}")]
    Transport(String),

    /// The backend did not answer in time.
    #[error("Backend request timed out")]
    TransportTimeout,

    // =========================================================================
    // RANGING ERRORS
    // =========================================================================
    /// A region event named a region that is not monitored.
    #[error("Region {0} is not monitored")]
    RegionNotMonitored(Uuid),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {0}")]
    ConfigNotFound(String),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for hitag operations.
pub type Result<T> = std::result::Result<T, HitagError>;

impl HitagError {
    /// Returns `true` if this error is related to credentials.
    #[inline]
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::NoSecret
                | Self::CredentialRevoked
                | Self::AuthenticationFailed(_)
                | Self::Unauthorized(_)
        )
    }

    /// Returns `true` if this error is related to the backend link.
    #[inline]
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::BackendStatus(_) | Self::Transport(_) | Self::TransportTimeout
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if this error is likely recoverable without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::TransportTimeout | Self::AuthenticationFailed(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 401 Unauthorized - credentials missing or refused
            Self::NoSecret | Self::CredentialRevoked | Self::Unauthorized(_) => 401,

            // 404 Not Found
            Self::ConfigNotFound(_) | Self::RegionNotMonitored(_) => 404,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 502 Bad Gateway - the backend misbehaved
            Self::BackendStatus(_) | Self::AuthenticationFailed(_) => 502,

            // 503 Service Unavailable - backend unreachable
            Self::Transport(_) => 503,

            // 504 Gateway Timeout
            Self::TransportTimeout => 504,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoSecret => "NO_SECRET",
            Self::CredentialRevoked => "CREDENTIAL_REVOKED",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::BackendStatus(_) => "BACKEND_STATUS",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::TransportTimeout => "TRANSPORT_TIMEOUT",
            Self::RegionNotMonitored(_) => "REGION_NOT_MONITORED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for HitagError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
            ConfigError::DirectoryUnavailable => {
                Self::PersistenceError("Cannot determine configuration directory".to_string())
            }
        }
    }
}

impl From<crate::auth::AuthError> for HitagError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;
        match err {
            AuthError::NoSecret => Self::NoSecret,
            AuthError::CredentialRevoked | AuthError::SecretRejected { .. } => {
                Self::CredentialRevoked
            }
            other @ (AuthError::ExchangeFailed(_)
            | AuthError::MalformedResponse(_)
            | AuthError::WaitTimedOut(_)
            | AuthError::RefreshAbandoned) => Self::AuthenticationFailed(other.to_string()),
        }
    }
}

impl From<crate::link::TransportError> for HitagError {
    fn from(err: crate::link::TransportError) -> Self {
        use crate::link::TransportError;
        match err {
            TransportError::Timeout => Self::TransportTimeout,
            TransportError::Network(message) | TransportError::InvalidRequest(message) => {
                Self::Transport(message)
            }
        }
    }
}

impl From<crate::pipeline::PipelineError> for HitagError {
    fn from(err: crate::pipeline::PipelineError) -> Self {
        use crate::pipeline::PipelineError;
        match err {
            PipelineError::Credential(e) => Self::from(e),
            PipelineError::Unauthorized {
                refresh_error: Some(e),
                ..
            } if e.is_terminal() => Self::CredentialRevoked,
            PipelineError::Unauthorized { response, .. } => Self::Unauthorized(response.status),
            PipelineError::Status(response) => Self::BackendStatus(response.status),
            PipelineError::Transport(e) => Self::from(e),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
