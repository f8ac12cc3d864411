//! The assembled hitag runtime.
//!
//! [`HitagContext`] owns one instance of every component and routes host
//! callbacks to them: region entries and exits go to the [`RegionMonitor`],
//! ranging ticks for ranged regions go to the [`PresenceTracker`], and the
//! resulting transitions are queued on the [`ScanUploader`]. Ticks are applied
//! one at a time in the order the host delivers them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AuthCoordinator, HostNotifier, LinkTokenExchange, TokenExchange};
use crate::config::HitagConfig;
use crate::error::{HitagError, Result};
use crate::link::{HttpSyncLink, SyncLink};
use crate::pipeline::{PipelineError, RequestPipeline};
use crate::presence::PresenceTracker;
use crate::region::{ProximityRegion, RegionMonitor};
use crate::types::{PresenceEvent, RawObservation, Tag, TagId, TagState};
use crate::upload::ScanUploader;

/// Point-in-time view of the tracking session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PresenceSnapshot {
    /// Active tags, strongest signal first.
    pub active: Vec<Tag>,

    /// Passive tags, most recently seen first.
    pub passive: Vec<Tag>,

    /// Number of distinct tags seen this session.
    pub seen: usize,

    /// Regions currently being ranged.
    pub ranging: Vec<Uuid>,

    /// Scan records waiting to be uploaded.
    pub pending_uploads: usize,
}

/// What the session knows about one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TagPresence {
    /// Tag identifier.
    pub id: TagId,

    /// Current state.
    pub state: TagState,

    /// Latest reading, absent for tags never seen.
    pub last_reading: Option<Tag>,
}

/// A monitored region and whether it is being ranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegionStatus {
    /// Region UUID.
    pub id: Uuid,

    /// Whether ranging ticks for this region are consumed.
    pub ranging: bool,
}

#[derive(Debug)]
struct Session {
    regions: RegionMonitor,
    tracker: PresenceTracker,
}

/// Every hitag component, wired together.
pub struct HitagContext<L> {
    session: Mutex<Session>,
    auth: AuthCoordinator,
    pipeline: Arc<RequestPipeline<L>>,
    uploader: ScanUploader<L>,
}

impl<L> std::fmt::Debug for HitagContext<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitagContext")
            .field("auth", &self.auth)
            .field("uploader", &self.uploader)
            .finish_non_exhaustive()
    }
}

impl HitagContext<HttpSyncLink> {
    /// Build a context talking to the backend named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the region or API settings are invalid.
    pub fn from_config(config: &HitagConfig, notifier: Arc<dyn HostNotifier>) -> Result<Self> {
        let link = Arc::new(HttpSyncLink::from_config(&config.api)?);
        info!(base_url = %link.base_url(), "Backend link configured");
        Self::new(config, link, notifier)
    }
}

impl<L: SyncLink + 'static> HitagContext<L> {
    /// Build a context over `link`, exchanging tokens through the same link.
    ///
    /// # Errors
    ///
    /// Returns an error if the region settings are invalid.
    pub fn new(config: &HitagConfig, link: Arc<L>, notifier: Arc<dyn HostNotifier>) -> Result<Self> {
        let exchange = Arc::new(LinkTokenExchange::new(link.clone()));
        Self::with_exchange(config, link, exchange, notifier)
    }

    /// Build a context with an explicit token exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the region settings are invalid.
    pub fn with_exchange(
        config: &HitagConfig,
        link: Arc<L>,
        exchange: Arc<dyn TokenExchange>,
        notifier: Arc<dyn HostNotifier>,
    ) -> Result<Self> {
        let regions = ProximityRegion::from_config(&config.regions)?;
        let auth = AuthCoordinator::new(
            exchange,
            notifier.clone(),
            config.api.refresh_wait_timeout(),
        );
        let pipeline = Arc::new(RequestPipeline::new(link, auth.clone(), notifier));
        let uploader = ScanUploader::new(
            pipeline.clone(),
            config.upload.max_batch,
            config.upload.max_pending,
        );

        Ok(Self {
            session: Mutex::new(Session {
                regions: RegionMonitor::new(regions),
                tracker: PresenceTracker::new(config.tracking.active_timeout()),
            }),
            auth,
            pipeline,
            uploader,
        })
    }
}

impl<L> HitagContext<L> {
    /// The credential coordinator.
    #[must_use]
    pub const fn auth(&self) -> &AuthCoordinator {
        &self.auth
    }

    /// The authenticated request pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &RequestPipeline<L> {
        &self.pipeline
    }

    /// The scan-record uploader.
    #[must_use]
    pub const fn uploader(&self) -> &ScanUploader<L> {
        &self.uploader
    }

    /// Handle entry into a monitored region.
    ///
    /// # Errors
    ///
    /// Returns [`HitagError::RegionNotMonitored`] for an unknown region.
    pub async fn enter_region(&self, region: Uuid) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.regions.enter(&region) {
            Ok(())
        } else {
            Err(HitagError::RegionNotMonitored(region))
        }
    }

    /// Handle exit from a region. Returns whether it was being ranged.
    pub async fn exit_region(&self, region: Uuid) -> bool {
        self.session.lock().await.regions.exit(&region)
    }

    /// Apply one ranging tick observed now.
    pub async fn on_ranging_tick(
        &self,
        region: Uuid,
        batch: Vec<RawObservation>,
    ) -> Vec<PresenceEvent> {
        self.on_ranging_tick_at(Utc::now(), region, batch).await
    }

    /// Apply one ranging tick observed at `now`.
    ///
    /// Ticks for regions that are not being ranged are dropped.
    #[instrument(skip(self, batch), fields(observations = batch.len()))]
    pub async fn on_ranging_tick_at(
        &self,
        now: DateTime<Utc>,
        region: Uuid,
        batch: Vec<RawObservation>,
    ) -> Vec<PresenceEvent> {
        let mut session = self.session.lock().await;
        if !session.regions.is_ranging(&region) {
            debug!(%region, "Dropping tick for region that is not ranged");
            return Vec::new();
        }
        let events = session.tracker.observe_at(now, batch);

        // Enqueue under the session lock so the upload queue keeps tick order.
        self.uploader.enqueue(&events);
        drop(session);

        for event in &events {
            info!(
                tag = %event.tag_id,
                from = %event.from,
                to = %event.to,
                rssi = event.rssi,
                "Tag state changed"
            );
        }
        events
    }

    /// Current session view.
    pub async fn snapshot(&self) -> PresenceSnapshot {
        let session = self.session.lock().await;
        PresenceSnapshot {
            active: session.tracker.active().into_iter().cloned().collect(),
            passive: session.tracker.passive().into_iter().cloned().collect(),
            seen: session.tracker.seen_count(),
            ranging: session.regions.ranging().copied().collect(),
            pending_uploads: self.uploader.pending(),
        }
    }

    /// State of a single tag.
    pub async fn tag(&self, id: &TagId) -> TagPresence {
        let session = self.session.lock().await;
        TagPresence {
            id: id.clone(),
            state: session.tracker.state_of(id),
            last_reading: session.tracker.tag(id).cloned(),
        }
    }

    /// Every monitored region with its ranging flag.
    pub async fn regions(&self) -> Vec<RegionStatus> {
        let session = self.session.lock().await;
        session
            .regions
            .regions()
            .identifiers()
            .iter()
            .map(|&id| RegionStatus {
                id,
                ranging: session.regions.is_ranging(&id),
            })
            .collect()
    }

    /// End the tracking session: stop ranging and forget every tag.
    ///
    /// Queued scan records are kept for the next flush.
    pub async fn end_session(&self) {
        let mut session = self.session.lock().await;
        session.regions.stop_all();
        session.tracker.reset();
        info!("Tracking session ended");
    }
}

impl<L: SyncLink> HitagContext<L> {
    /// Upload queued scan records.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error of the first failed batch.
    pub async fn flush_uploads(&self) -> std::result::Result<usize, PipelineError> {
        self.uploader.flush().await
    }
}
