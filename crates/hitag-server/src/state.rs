//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use hitag_core::{HitagConfig, HitagContext, HttpSyncLink, SyncLink, TracingNotifier};

/// The runtime the daemon drives, over any backend link.
pub type Runtime = HitagContext<Box<dyn SyncLink>>;

/// Shared application state handed to every handler.
pub type SharedState = Arc<AppState>;

/// Everything a request handler needs.
#[derive(Debug)]
pub struct AppState {
    /// Loaded configuration.
    pub config: HitagConfig,

    /// Presence, region and credential runtime.
    pub runtime: Runtime,

    started_at: Instant,
}

impl AppState {
    /// Create state talking to the backend configured in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the region or API settings are invalid.
    pub fn new(config: HitagConfig) -> hitag_core::Result<Self> {
        let link: Box<dyn SyncLink> = Box::new(HttpSyncLink::from_config(&config.api)?);
        Self::with_link(config, link)
    }

    /// Create state over an explicit backend link.
    ///
    /// # Errors
    ///
    /// Returns an error if the region settings are invalid.
    pub fn with_link(config: HitagConfig, link: Box<dyn SyncLink>) -> hitag_core::Result<Self> {
        let runtime = HitagContext::new(&config, Arc::new(link), Arc::new(TracingNotifier))?;
        Ok(Self {
            config,
            runtime,
            started_at: Instant::now(),
        })
    }

    /// Wrap into the shared handle used by the router.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
