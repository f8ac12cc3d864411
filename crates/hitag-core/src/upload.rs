//! Upload of presence transitions to the backend.
//!
//! Every [`PresenceEvent`] becomes a [`ScanRecord`] queued in memory.
//! [`ScanUploader::flush`] drains the queue in batches through the request
//! pipeline, so uploads share the credential refresh and retry behaviour of
//! every other backend call. A failed batch goes back to the front of the
//! queue in its original order. The queue holds at most `max_pending`
//! records; past that the oldest are dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::link::{endpoints, OutboundRequest, SyncLink};
use crate::pipeline::{PipelineError, RequestPipeline};
use crate::types::{PresenceEvent, TagId, TagState};

/// One tag transition as the backend stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScanRecord {
    /// Tag identifier.
    pub id: TagId,

    /// Signal strength at transition time (dBm).
    pub rssi: i16,

    /// State the tag moved into.
    pub state: TagState,

    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

impl From<&PresenceEvent> for ScanRecord {
    fn from(event: &PresenceEvent) -> Self {
        Self {
            id: event.tag_id.clone(),
            rssi: event.rssi,
            state: event.to,
            timestamp: event.at,
        }
    }
}

/// Queues scan records and uploads them in batches.
pub struct ScanUploader<L> {
    pipeline: Arc<RequestPipeline<L>>,
    queue: Mutex<VecDeque<ScanRecord>>,
    flushing: tokio::sync::Mutex<()>,
    max_batch: usize,
    max_pending: usize,
}

impl<L> std::fmt::Debug for ScanUploader<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanUploader")
            .field("pending", &self.pending())
            .field("max_batch", &self.max_batch)
            .field("max_pending", &self.max_pending)
            .finish_non_exhaustive()
    }
}

impl<L> ScanUploader<L> {
    /// Create an uploader sending at most `max_batch` records per request
    /// and holding at most `max_pending` records.
    #[must_use]
    pub fn new(pipeline: Arc<RequestPipeline<L>>, max_batch: usize, max_pending: usize) -> Self {
        let max_batch = max_batch.max(1);
        Self {
            pipeline,
            queue: Mutex::new(VecDeque::new()),
            flushing: tokio::sync::Mutex::new(()),
            max_batch,
            max_pending: max_pending.max(max_batch),
        }
    }

    /// Queue one record per event.
    pub fn enqueue(&self, events: &[PresenceEvent]) {
        if events.is_empty() {
            return;
        }
        let mut queue = self.lock();
        queue.extend(events.iter().map(ScanRecord::from));
        self.drop_overflow(&mut queue);
        debug!(added = events.len(), pending = queue.len(), "Queued scan records");
    }

    /// Number of records waiting to be uploaded.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Drop every queued record.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ScanRecord>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_batch(&self) -> Vec<ScanRecord> {
        let mut queue = self.lock();
        let count = queue.len().min(self.max_batch);
        queue.drain(..count).collect()
    }

    fn requeue_front(&self, batch: Vec<ScanRecord>) {
        let mut queue = self.lock();
        for record in batch.into_iter().rev() {
            queue.push_front(record);
        }
        self.drop_overflow(&mut queue);
    }

    fn drop_overflow(&self, queue: &mut VecDeque<ScanRecord>) {
        let excess = queue.len().saturating_sub(self.max_pending);
        if excess > 0 {
            queue.drain(..excess);
            warn!(
                dropped = excess,
                max_pending = self.max_pending,
                "Upload queue full, dropped oldest scan records"
            );
        }
    }
}

impl<L: SyncLink> ScanUploader<L> {
    /// Upload everything queued so far.
    ///
    /// Returns the number of records the backend accepted. Records queued
    /// while a flush is running are picked up by the same flush.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error of the first batch that failed. That batch
    /// and everything after it stay queued.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<usize, PipelineError> {
        let _flushing = self.flushing.lock().await;
        let mut uploaded = 0;

        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                break;
            }

            let body = serde_json::json!({ "scan_record": batch });
            let request = OutboundRequest::post(endpoints::SCAN_RECORD, body);
            match self.pipeline.execute(&request).await {
                Ok(_) => uploaded += batch.len(),
                Err(error) => {
                    warn!(
                        error = %error,
                        uploaded,
                        requeued = batch.len(),
                        "Scan record upload failed"
                    );
                    self.requeue_front(batch);
                    return Err(error);
                }
            }
        }

        if uploaded > 0 {
            info!(uploaded, "Uploaded scan records");
        }
        Ok(uploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{TransportError, TransportResponse};
    use crate::testing::{coordinator_with, MockExchange, RecordingNotifier, ScriptedLink};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(id: &str, to: TagState, second: u32) -> PresenceEvent {
        PresenceEvent {
            tag_id: TagId::parse(id).unwrap(),
            from: TagState::Unknown,
            to,
            rssi: -60,
            at: Utc.with_ymd_and_hms(2025, 1, 15, 3, 30, second).unwrap(),
        }
    }

    fn uploader(link: Arc<ScriptedLink>, max_batch: usize) -> ScanUploader<ScriptedLink> {
        capped_uploader(link, max_batch, usize::MAX)
    }

    fn capped_uploader(
        link: Arc<ScriptedLink>,
        max_batch: usize,
        max_pending: usize,
    ) -> ScanUploader<ScriptedLink> {
        let exchange = Arc::new(MockExchange::open());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator_with(&exchange, &notifier);
        auth.set_secret("secret");
        let pipeline = Arc::new(RequestPipeline::new(link, auth, notifier));
        ScanUploader::new(pipeline, max_batch, max_pending)
    }

    fn uploaded_ids(link: &ScriptedLink) -> Vec<Vec<String>> {
        link.requests()
            .into_iter()
            .filter(|(request, _)| request.endpoint == endpoints::SCAN_RECORD)
            .map(|(request, _)| {
                request.body["scan_record"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|record| record["id"].as_str().unwrap().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_scan_record_from_event() {
        let record = ScanRecord::from(&event("1A2B", TagState::Active, 5));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], "1A2B");
        assert_eq!(json["rssi"], -60);
        assert_eq!(json["state"], "active");
        assert_eq!(json["timestamp"], "2025-01-15T03:30:05Z");
    }

    #[tokio::test]
    async fn test_flush_empty_queue_sends_nothing() {
        let link = Arc::new(ScriptedLink::accepting_fresh_tokens());
        let uploader = uploader(link.clone(), 10);

        assert_eq!(uploader.flush().await.unwrap(), 0);
        assert!(link.requests().is_empty());
    }

    #[tokio::test]
    async fn test_flush_splits_into_batches_in_order() {
        let link = Arc::new(ScriptedLink::accepting_fresh_tokens());
        let uploader = uploader(link.clone(), 2);
        uploader.enqueue(&[
            event("A1", TagState::Active, 1),
            event("A2", TagState::Passive, 2),
            event("A3", TagState::Active, 3),
        ]);

        assert_eq!(uploader.flush().await.unwrap(), 3);
        assert_eq!(uploader.pending(), 0);
        assert_eq!(
            uploaded_ids(&link),
            vec![vec!["A1", "A2"], vec!["A3"]]
        );
    }

    #[tokio::test]
    async fn test_failed_batch_is_requeued_in_order() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let link = Arc::new(ScriptedLink::new(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(TransportError::Network("connection reset".into()))
            } else {
                Ok(TransportResponse::new(200, Vec::new()))
            }
        }));
        let uploader = uploader(link.clone(), 1);
        uploader.enqueue(&[
            event("B1", TagState::Active, 1),
            event("B2", TagState::Active, 2),
            event("B3", TagState::Passive, 3),
        ]);

        let error = uploader.flush().await.unwrap_err();
        assert!(matches!(error, PipelineError::Transport(_)));
        assert_eq!(uploader.pending(), 2);

        assert_eq!(uploader.flush().await.unwrap(), 2);
        assert_eq!(
            uploaded_ids(&link),
            vec![vec!["B1"], vec!["B2"], vec!["B2"], vec!["B3"]]
        );
    }

    #[tokio::test]
    async fn test_backend_rejection_keeps_records() {
        let link = Arc::new(ScriptedLink::new(|_, _| {
            Ok(TransportResponse::new(500, Vec::new()))
        }));
        let uploader = uploader(link, 10);
        uploader.enqueue(&[event("C1", TagState::Active, 1)]);

        let error = uploader.flush().await.unwrap_err();
        assert_eq!(error.status(), Some(500));
        assert_eq!(uploader.pending(), 1);

        uploader.clear();
        assert_eq!(uploader.pending(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_oldest_records() {
        let link = Arc::new(ScriptedLink::accepting_fresh_tokens());
        let uploader = capped_uploader(link.clone(), 2, 3);
        uploader.enqueue(&[
            event("D1", TagState::Active, 1),
            event("D2", TagState::Active, 2),
        ]);
        uploader.enqueue(&[
            event("D3", TagState::Passive, 3),
            event("D4", TagState::Active, 4),
            event("D5", TagState::Passive, 5),
        ]);
        assert_eq!(uploader.pending(), 3);

        assert_eq!(uploader.flush().await.unwrap(), 3);
        assert_eq!(uploaded_ids(&link), vec![vec!["D3", "D4"], vec!["D5"]]);
    }

    #[tokio::test]
    async fn test_requeue_respects_pending_cap() {
        let link = Arc::new(ScriptedLink::new(|_, _| {
            Ok(TransportResponse::new(503, Vec::new()))
        }));
        let uploader = capped_uploader(link, 2, 2);
        uploader.enqueue(&[
            event("E1", TagState::Active, 1),
            event("E2", TagState::Active, 2),
            event("E3", TagState::Active, 3),
        ]);
        assert_eq!(uploader.pending(), 2);

        assert!(uploader.flush().await.is_err());
        assert_eq!(uploader.pending(), 2);
    }
}
