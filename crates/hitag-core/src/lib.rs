//! # hitag-core
//!
//! Core business logic for hitag presence tracking.
//!
//! This crate provides:
//! - Tag presence tracking (unknown → active → passive) from ranging ticks
//! - Beacon region monitoring
//! - Session credential management with single-flight token refresh
//! - An authenticated request pipeline with one refresh-and-retry on 401
//! - Batched upload of tag transitions to the backend
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Tag identifiers, observations, states and events
//! - [`presence`] - The presence state machine
//! - [`region`] - Monitored regions and which of them are ranged
//! - [`credential`] - Long-lived secret and session token
//! - [`auth`] - Credential coordinator and token exchange
//! - [`link`] - Transport boundary to the backend
//! - [`pipeline`] - Authenticated request execution
//! - [`upload`] - Scan-record queue and batched upload
//! - [`context`] - All of the above wired together
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod link;
pub mod pipeline;
pub mod presence;
pub mod region;
pub mod types;
pub mod upload;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use auth::{
    AuthCoordinator, AuthError, AuthPhase, AuthStatus, HostNotifier, LinkTokenExchange,
    RefreshOutcome, TokenExchange, TracingNotifier,
};
pub use config::{
    default_config_path, ApiConfig, ConfigError, ConfigResult, HitagConfig, RegionsConfig,
    ServerConfig, TrackingConfig, UploadConfig,
};
pub use context::{HitagContext, PresenceSnapshot, RegionStatus, TagPresence};
pub use credential::{SessionCredential, SessionToken};
pub use error::{HitagError, Result};
pub use link::{
    HttpSyncLink, OutboundRequest, SyncLink, TransportError, TransportResponse,
};
pub use pipeline::{PipelineError, RequestPipeline};
pub use presence::PresenceTracker;
pub use region::{ProximityRegion, RegionMonitor};
pub use types::{HealthResponse, PresenceEvent, RawObservation, Tag, TagId, TagState};
pub use upload::{ScanRecord, ScanUploader};
