//! Presence tracking for ranged hitags.
//!
//! Each ranging tick delivers every beacon the radio layer can currently see.
//! The tracker turns that noisy stream into two sets:
//!
//! - **active** tags, observed within the active timeout
//! - **passive** tags, once active but silent for longer than the timeout
//!
//! Only the strongest beacon of a tick is promoted to active. Co-observed
//! weaker beacons are not tracked for that tick.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::types::{PresenceEvent, RawObservation, Tag, TagId, TagState};

/// Default active timeout.
pub const DEFAULT_ACTIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// In-memory presence state machine.
///
/// Not internally synchronized: ticks are expected from a single ordered
/// source.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    active_timeout: TimeDelta,
    history: HashMap<TagId, Tag>,
    active: HashMap<TagId, Tag>,
    passive: HashMap<TagId, Tag>,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVE_TIMEOUT)
    }
}

impl PresenceTracker {
    /// Create a tracker that demotes tags after `active_timeout` of silence.
    #[must_use]
    pub fn new(active_timeout: Duration) -> Self {
        Self {
            active_timeout: TimeDelta::from_std(active_timeout).unwrap_or(TimeDelta::MAX),
            history: HashMap::new(),
            active: HashMap::new(),
            passive: HashMap::new(),
        }
    }

    /// Consume a ranging tick stamped with the current time.
    pub fn observe<I>(&mut self, batch: I) -> Vec<PresenceEvent>
    where
        I: IntoIterator<Item = RawObservation>,
    {
        self.observe_at(Utc::now(), batch)
    }

    /// Consume a ranging tick observed at `now`.
    ///
    /// Returns the transitions caused by the tick, demotions first, in the
    /// order they happened.
    pub fn observe_at<I>(&mut self, now: DateTime<Utc>, batch: I) -> Vec<PresenceEvent>
    where
        I: IntoIterator<Item = RawObservation>,
    {
        let mut events = self.demote_expired(now);

        if let Some((id, rssi)) = strongest(batch) {
            if let Some(event) = self.promote(id, rssi, now) {
                events.push(event);
            }
        }

        events
    }

    /// Current state of `id`.
    #[must_use]
    pub fn state_of(&self, id: &TagId) -> TagState {
        if self.active.contains_key(id) {
            TagState::Active
        } else if self.passive.contains_key(id) {
            TagState::Passive
        } else {
            TagState::Unknown
        }
    }

    /// Latest record for `id`, if it was ever seen this session.
    #[must_use]
    pub fn tag(&self, id: &TagId) -> Option<&Tag> {
        self.history.get(id)
    }

    /// Active tags, strongest signal first.
    #[must_use]
    pub fn active(&self) -> Vec<&Tag> {
        sorted_by_signal(self.active.values())
    }

    /// Passive tags, most recently seen first.
    #[must_use]
    pub fn passive(&self) -> Vec<&Tag> {
        let mut tags: Vec<&Tag> = self.passive.values().collect();
        tags.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at).then(a.id.cmp(&b.id)));
        tags
    }

    /// Every tag seen this session.
    pub fn history(&self) -> impl Iterator<Item = &Tag> {
        self.history.values()
    }

    /// Number of tags seen this session.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.history.len()
    }

    /// End the tracking session, forgetting every tag.
    pub fn reset(&mut self) {
        debug!(
            seen = self.history.len(),
            active = self.active.len(),
            passive = self.passive.len(),
            "Presence tracking session reset"
        );
        self.history.clear();
        self.active.clear();
        self.passive.clear();
    }

    fn demote_expired(&mut self, now: DateTime<Utc>) -> Vec<PresenceEvent> {
        let mut expired: Vec<TagId> = self
            .active
            .values()
            .filter(|tag| now.signed_duration_since(tag.last_seen_at) > self.active_timeout)
            .map(|tag| tag.id.clone())
            .collect();
        expired.sort_by(|a, b| {
            let seen = |id: &TagId| self.active.get(id).map(|t| t.last_seen_at);
            seen(a).cmp(&seen(b)).then_with(|| a.cmp(b))
        });

        let mut events = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(tag) = self.active.remove(&id) {
                debug!(tag = %id, last_seen_at = %tag.last_seen_at, "Tag demoted to passive");
                events.push(PresenceEvent {
                    tag_id: id.clone(),
                    from: TagState::Active,
                    to: TagState::Passive,
                    rssi: tag.rssi,
                    at: now,
                });
                self.passive.insert(id, tag);
            }
        }
        events
    }

    fn promote(&mut self, id: TagId, rssi: i16, now: DateTime<Utc>) -> Option<PresenceEvent> {
        let previous = self.state_of(&id);
        let tag = Tag {
            id: id.clone(),
            rssi,
            last_seen_at: now,
        };

        self.passive.remove(&id);
        self.history.insert(id.clone(), tag.clone());
        self.active.insert(id.clone(), tag);

        if previous == TagState::Active {
            trace!(tag = %id, rssi, "Active tag refreshed");
            return None;
        }

        debug!(tag = %id, rssi, from = %previous, "Tag promoted to active");
        Some(PresenceEvent {
            tag_id: id,
            from: previous,
            to: TagState::Active,
            rssi,
            at: now,
        })
    }
}

/// Strongest well-formed observation; on equal RSSI the later one wins.
fn strongest<I>(batch: I) -> Option<(TagId, i16)>
where
    I: IntoIterator<Item = RawObservation>,
{
    batch
        .into_iter()
        .filter_map(|obs| match obs.tag_id() {
            Some(id) => Some((id, obs.rssi)),
            None => {
                trace!(major = obs.major, minor = obs.minor, "Dropping malformed observation");
                None
            }
        })
        .fold(None, |best, (id, rssi)| match best {
            Some((_, best_rssi)) if rssi < best_rssi => best,
            _ => Some((id, rssi)),
        })
}

fn sorted_by_signal<'a>(tags: impl Iterator<Item = &'a Tag>) -> Vec<&'a Tag> {
    let mut tags: Vec<&Tag> = tags.collect();
    tags.sort_by(|a, b| b.rssi.cmp(&a.rssi).then(a.id.cmp(&b.id)));
    tags
}
