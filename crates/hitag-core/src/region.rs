//! Beacon regions and the monitoring/ranging lifecycle.
//!
//! Hitags advertise under one of a fixed set of region UUIDs. The device
//! monitors all of them; entering any region starts ranging across the whole
//! set, and leaving a region stops ranging it.

use std::collections::BTreeSet;

use tracing::debug;
use uuid::Uuid;

use crate::config::{ConfigError, ConfigResult, RegionsConfig};

/// Static list of region identifiers to monitor and range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProximityRegion {
    identifiers: Vec<Uuid>,
}

impl ProximityRegion {
    /// UUID text shared by the stock hitag regions.
    pub const DEFAULT_UUID_PREFIX: &'static str = "0000BEEF-6275-7962-7564-6479666565";

    /// Number of stock hitag regions.
    pub const DEFAULT_COUNT: u16 = 20;

    /// Build the region list from configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `count` is zero or above 256, or when
    /// the prefix plus a serial byte does not form a UUID.
    pub fn from_config(config: &RegionsConfig) -> ConfigResult<Self> {
        if config.count == 0 || config.count > 256 {
            return Err(ConfigError::ValidationError {
                field: "regions.count".to_string(),
                message: format!("must be between 1 and 256 (got {})", config.count),
            });
        }

        let identifiers = (0..config.count)
            .map(|serial| {
                let text = format!("{}{serial:02X}", config.uuid_prefix);
                Uuid::parse_str(&text).map_err(|e| ConfigError::ValidationError {
                    field: "regions.uuid_prefix".to_string(),
                    message: format!("'{text}' is not a UUID: {e}"),
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self { identifiers })
    }

    /// Build from an explicit list.
    #[must_use]
    pub fn from_identifiers(identifiers: Vec<Uuid>) -> Self {
        Self { identifiers }
    }

    /// All monitored identifiers, in serial order.
    #[must_use]
    pub fn identifiers(&self) -> &[Uuid] {
        &self.identifiers
    }

    /// Whether `id` is one of the monitored regions.
    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.identifiers.contains(id)
    }
}

impl Default for ProximityRegion {
    fn default() -> Self {
        Self::from_config(&RegionsConfig::default())
            .unwrap_or_else(|_| Self::from_identifiers(Vec::new()))
    }
}

/// Tracks which monitored regions are currently being ranged.
#[derive(Debug, Clone, Default)]
pub struct RegionMonitor {
    regions: ProximityRegion,
    ranging: BTreeSet<Uuid>,
}

impl RegionMonitor {
    /// Create a monitor over `regions`, initially ranging nothing.
    #[must_use]
    pub fn new(regions: ProximityRegion) -> Self {
        Self {
            regions,
            ranging: BTreeSet::new(),
        }
    }

    /// The monitored regions.
    #[must_use]
    pub const fn regions(&self) -> &ProximityRegion {
        &self.regions
    }

    /// Handle a region entry. Starts ranging on every monitored region.
    ///
    /// Returns `false` if `region` is not monitored, in which case nothing
    /// changes.
    pub fn enter(&mut self, region: &Uuid) -> bool {
        if !self.regions.contains(region) {
            debug!(%region, "Ignoring entry into unmonitored region");
            return false;
        }
        self.ranging.extend(self.regions.identifiers().iter().copied());
        debug!(%region, ranging = self.ranging.len(), "Region entered, ranging started");
        true
    }

    /// Handle a region exit. Stops ranging that region only.
    ///
    /// Returns `true` if the region was being ranged.
    pub fn exit(&mut self, region: &Uuid) -> bool {
        let was_ranging = self.ranging.remove(region);
        debug!(%region, was_ranging, "Region exited");
        was_ranging
    }

    /// Whether ticks for `region` should be consumed.
    #[must_use]
    pub fn is_ranging(&self, region: &Uuid) -> bool {
        self.ranging.contains(region)
    }

    /// Regions currently being ranged.
    pub fn ranging(&self) -> impl Iterator<Item = &Uuid> {
        self.ranging.iter()
    }

    /// Stop ranging everything.
    pub fn stop_all(&mut self) {
        self.ranging.clear();
    }
}
