//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use crate::auth::{AuthCoordinator, AuthError, HostNotifier, RefreshOutcome, TokenExchange};
use crate::credential::SessionToken;
use crate::link::{OutboundRequest, SyncLink, TransportError, TransportResponse};
use crate::pipeline::PipelineError;

/// Token exchange that counts calls and can be held closed.
///
/// Successful exchanges return `token-N`, N being the 1-based call number.
pub struct MockExchange {
    calls: AtomicUsize,
    gate: Semaphore,
    results: Mutex<VecDeque<RefreshOutcome>>,
    secrets: Mutex<Vec<String>>,
}

impl MockExchange {
    /// Exchanges complete immediately.
    pub fn open() -> Self {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    /// Exchanges block until [`MockExchange::release`] is called.
    pub fn gated() -> Self {
        Self::with_permits(0)
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(permits),
            results: Mutex::new(VecDeque::new()),
            secrets: Mutex::new(Vec::new()),
        }
    }

    /// Let `count` exchanges through.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Queue an outcome for the next exchange.
    pub fn push_result(&self, result: RefreshOutcome) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn secrets(&self) -> Vec<String> {
        self.secrets.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchange for MockExchange {
    async fn exchange(&self, secret: &str) -> RefreshOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.secrets.lock().unwrap().push(secret.to_string());
        self.gate.acquire().await.unwrap().forget();

        let scripted = self.results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(SessionToken::new(format!("token-{call}"), Utc::now())))
    }
}

/// Notifier that counts what it was told.
#[derive(Default)]
pub struct RecordingNotifier {
    invalid: AtomicUsize,
    failed: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn invalid_count(&self) -> usize {
        self.invalid.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> Vec<String> {
        self.failed.lock().unwrap().clone()
    }
}

impl HostNotifier for RecordingNotifier {
    fn credential_invalid(&self, _reason: &AuthError) {
        self.invalid.fetch_add(1, Ordering::SeqCst);
    }

    fn request_failed(&self, error: &PipelineError) {
        self.failed.lock().unwrap().push(error.to_string());
    }
}

type Responder =
    dyn Fn(&OutboundRequest, Option<&str>) -> Result<TransportResponse, TransportError> + Send + Sync;

/// Link that answers from a closure and records what it was sent.
pub struct ScriptedLink {
    responder: Box<Responder>,
    requests: Mutex<Vec<(OutboundRequest, Option<String>)>>,
}

impl ScriptedLink {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&OutboundRequest, Option<&str>) -> Result<TransportResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Accepts `Bearer token-*`, rejects anything else with 401.
    pub fn accepting_fresh_tokens() -> Self {
        Self::new(|_, auth| match auth {
            Some(value) if value.starts_with("Bearer token-") => {
                Ok(TransportResponse::new(200, br#"{"ok":true}"#.to_vec()))
            }
            _ => Ok(TransportResponse::new(401, Vec::new())),
        })
    }

    pub fn requests(&self) -> Vec<(OutboundRequest, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncLink for ScriptedLink {
    async fn send(
        &self,
        request: &OutboundRequest,
        authorization: Option<&str>,
    ) -> Result<TransportResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), authorization.map(str::to_string)));
        tokio::task::yield_now().await;
        (self.responder)(request, authorization)
    }
}

/// Yield until `count` callers are queued on the coordinator.
pub async fn wait_for_waiters(auth: &AuthCoordinator, count: usize) {
    while auth.status().waiters < count {
        tokio::task::yield_now().await;
    }
}

/// Coordinator wired to `exchange` and `notifier` with no wait bound.
pub fn coordinator_with(
    exchange: &Arc<MockExchange>,
    notifier: &Arc<RecordingNotifier>,
) -> AuthCoordinator {
    AuthCoordinator::new(exchange.clone(), notifier.clone(), None)
}
