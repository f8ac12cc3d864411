//! Shared types and OpenAPI schemas.
//!
//! Tags are identified by the major/minor pair the radio layer reports for
//! each ranged beacon. Everything else in the crate keys off [`TagId`].

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Uppercase hexadecimal, as produced by [`TagId::from_parts`].
static TAG_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-F]{2,8}$").expect("tag id pattern is valid"));

/// Identifier of a hitag.
///
/// Built from the beacon's major and minor values, each rendered as unpadded
/// uppercase hexadecimal and concatenated (`major‖minor`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "1A2B")]
pub struct TagId(String);

impl TagId {
    /// Build an id from raw major/minor values.
    ///
    /// Returns `None` when either value is outside the 16-bit range the radio
    /// layer uses.
    #[must_use]
    pub fn from_parts(major: i64, minor: i64) -> Option<Self> {
        let major = u16::try_from(major).ok()?;
        let minor = u16::try_from(minor).ok()?;
        Some(Self(format!("{major:X}{minor:X}")))
    }

    /// Parse an id that was previously rendered with [`TagId::from_parts`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim().replace(' ', "");
        TAG_ID_PATTERN
            .is_match(&trimmed)
            .then_some(Self(trimmed))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One beacon as delivered by the ranging collaborator, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"major": 26, "minor": 43, "rssi": -52}))]
pub struct RawObservation {
    /// Beacon major value.
    #[serde(default = "malformed_part", deserialize_with = "lenient_part")]
    pub major: i64,

    /// Beacon minor value.
    #[serde(default = "malformed_part", deserialize_with = "lenient_part")]
    pub minor: i64,

    /// Received signal strength in dBm.
    #[schema(example = -52)]
    pub rssi: i16,
}

/// Stand-in for a major/minor value that is missing or not an integer.
/// Out of the 16-bit range, so [`RawObservation::tag_id`] rejects it.
const MALFORMED_PART: i64 = -1;

const fn malformed_part() -> i64 {
    MALFORMED_PART
}

/// Accept any JSON value for a major/minor field. Anything that is not an
/// integer becomes [`MALFORMED_PART`], so one bad beacon does not fail the
/// whole batch.
fn lenient_part<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_i64().unwrap_or(MALFORMED_PART))
}

impl RawObservation {
    /// Create an observation.
    #[must_use]
    pub const fn new(major: i64, minor: i64, rssi: i16) -> Self {
        Self { major, minor, rssi }
    }

    /// The tag id, or `None` if the major/minor pair is malformed.
    #[must_use]
    pub fn tag_id(&self) -> Option<TagId> {
        TagId::from_parts(self.major, self.minor)
    }
}

/// Lifecycle state of a tag within a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TagState {
    /// Never observed in this session.
    Unknown,
    /// Observed within the active timeout.
    Active,
    /// Was active, timed out, still remembered.
    Passive,
}

impl fmt::Display for TagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Active => "active",
            Self::Passive => "passive",
        };
        f.write_str(name)
    }
}

/// Latest known reading for a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Tag {
    /// Tag identifier.
    pub id: TagId,

    /// Most recent signal strength in dBm.
    #[schema(example = -52)]
    pub rssi: i16,

    /// When the tag was last observed (UTC).
    pub last_seen_at: DateTime<Utc>,
}

/// A state transition reported by the presence tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "tag_id": "1A2B",
    "from": "unknown",
    "to": "active",
    "rssi": -52,
    "at": "2025-01-15T03:30:00Z"
}))]
pub struct PresenceEvent {
    /// Tag that changed state.
    pub tag_id: TagId,

    /// State before the transition.
    pub from: TagState,

    /// State after the transition.
    pub to: TagState,

    /// Signal strength recorded with the tag at transition time.
    pub rssi: i16,

    /// When the transition happened.
    pub at: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version.
    #[schema(example = "0.1.0")]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_id_is_unpadded_uppercase_hex() {
        assert_eq!(TagId::from_parts(26, 43).unwrap().as_str(), "1A2B");
        assert_eq!(TagId::from_parts(1, 0).unwrap().as_str(), "10");
        assert_eq!(TagId::from_parts(65535, 255).unwrap().as_str(), "FFFFFF");
    }

    #[test]
    fn test_garbage_parts_do_not_fail_the_batch() {
        let batch: Vec<RawObservation> = serde_json::from_str(
            r#"[
                {"major": "zz", "minor": 1, "rssi": -90},
                {"minor": 7, "rssi": -80},
                {"major": 1.5, "minor": null, "rssi": -70},
                {"major": 26, "minor": 43, "rssi": -50}
            ]"#,
        )
        .unwrap();

        assert_eq!(batch.len(), 4);
        assert!(batch[..3].iter().all(|obs| obs.tag_id().is_none()));
        assert_eq!(batch[3], RawObservation::new(26, 43, -50));
        assert_eq!(batch[3].tag_id().unwrap().as_str(), "1A2B");
    }

    #[test]
    fn test_tag_id_rejects_out_of_range_parts() {
        assert!(TagId::from_parts(-1, 3).is_none());
        assert!(TagId::from_parts(3, 65536).is_none());
        assert!(RawObservation::new(70_000, 1, -40).tag_id().is_none());
    }

    #[test]
    fn test_tag_id_parse() {
        assert_eq!(TagId::parse("1A 2B").unwrap().as_str(), "1A2B");
        assert!(TagId::parse("1a2b").is_none());
        assert!(TagId::parse("").is_none());
        assert!(TagId::parse("XYZ").is_none());
    }

    #[test]
    fn test_tag_state_serializes_snake_case() {
        let json = serde_json::to_string(&TagState::Passive).unwrap();
        assert_eq!(json, "\"passive\"");
    }

    #[test]
    fn test_raw_observation_deserialization() {
        let obs: RawObservation =
            serde_json::from_str(r#"{"major": 1, "minor": 2, "rssi": -60}"#).unwrap();
        assert_eq!(obs, RawObservation::new(1, 2, -60));
    }
}
