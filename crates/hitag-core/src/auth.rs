//! Session credential coordination.
//!
//! [`AuthCoordinator`] owns the current [`SessionCredential`] and guarantees
//! that at most one token exchange is in flight. Callers that need a token
//! while an exchange runs are queued and all receive that exchange's outcome.
//!
//! # Lifecycle
//!
//! ```text
//!            set_secret / restore
//!   (none) ───────────────────────► Idle ◄───────────── exchange ok
//!                                    │                      │
//!          ensure_valid (no token)   │                      │
//!          invalidate (current token)▼                      │
//!                                Refreshing ────────────────┘
//!                                    │
//!                                    │ exchange failed
//!                                    ▼
//!                                 Revoked ── set_secret ──► Idle
//! ```
//!
//! Credential, phase and waiter queue live behind one mutex that is never held
//! across an `.await`. The exchange itself runs on a spawned task, so a caller
//! abandoning its wait cannot cancel it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::credential::{SessionCredential, SessionToken};
use crate::link::{endpoints, OutboundRequest, SyncLink};
use crate::pipeline::PipelineError;

/// Credential failures surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The host has not supplied an access secret.
    #[error("No access secret has been set. Supply one before making requests.")]
    NoSecret,

    /// An earlier exchange failed; the host must supply a new secret.
    #[error("The access credential is no longer valid. Supply a new access secret.")]
    CredentialRevoked,

    /// The backend refused the secret.
    #[error("Backend rejected the access secret (status {status})")]
    SecretRejected {
        /// Status returned by the exchange endpoint.
        status: u16,
    },

    /// The exchange could not be completed.
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    /// The exchange response could not be understood.
    #[error("Token exchange returned a malformed response: {0}")]
    MalformedResponse(String),

    /// This caller stopped waiting for an in-flight exchange.
    #[error("Timed out after {0:?} waiting for credential refresh")]
    WaitTimedOut(Duration),

    /// The exchange was dropped before producing an outcome.
    #[error("Credential refresh was abandoned before completing")]
    RefreshAbandoned,
}

impl AuthError {
    /// Whether the host has to supply a new secret before anything succeeds.
    ///
    /// Every exchange failure revokes the credential, so this covers the
    /// exchange outcomes as well as `CredentialRevoked`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CredentialRevoked
                | Self::SecretRejected { .. }
                | Self::ExchangeFailed(_)
                | Self::MalformedResponse(_)
        )
    }
}

/// Outcome delivered to every caller queued on an exchange.
pub type RefreshOutcome = Result<SessionToken, AuthError>;

/// Exchanges a long-lived secret for a session token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Perform exactly one exchange.
    async fn exchange(&self, secret: &str) -> RefreshOutcome;
}

/// Host notification channel.
pub trait HostNotifier: Send + Sync {
    /// The credential is permanently invalid. Called once per revocation.
    fn credential_invalid(&self, reason: &AuthError);

    /// A request failed. Called once per failed `execute`.
    fn request_failed(&self, _error: &PipelineError) {}
}

/// [`HostNotifier`] that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl HostNotifier for TracingNotifier {
    fn credential_invalid(&self, reason: &AuthError) {
        error!(%reason, "Access credential revoked; a new secret is required");
    }

    fn request_failed(&self, error: &PipelineError) {
        warn!(%error, "Backend request failed");
    }
}

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// No exchange running.
    Idle,
    /// One exchange in flight, callers queue behind it.
    Refreshing,
    /// Last exchange failed; requests fail fast until a new secret arrives.
    Revoked,
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthStatus {
    /// Current phase.
    pub phase: AuthPhase,

    /// Whether the host has supplied a secret.
    pub has_secret: bool,

    /// Issue time of the current token.
    pub token_issued_at: Option<DateTime<Utc>>,

    /// Callers queued on the in-flight exchange.
    pub waiters: usize,

    /// Exchanges started since construction.
    pub exchanges: u64,
}

struct CoordinatorState {
    credential: Option<SessionCredential>,
    phase: AuthPhase,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    /// Bumped whenever the secret changes, so stale exchange results are recognised.
    epoch: u64,
    exchanges: u64,
}

struct Inner {
    state: Mutex<CoordinatorState>,
    exchange: Arc<dyn TokenExchange>,
    notifier: Arc<dyn HostNotifier>,
    wait_timeout: Option<Duration>,
}

/// Single-flight owner of the session credential.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AuthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCoordinator")
            .field("status", &self.status())
            .field("wait_timeout", &self.inner.wait_timeout)
            .finish_non_exhaustive()
    }
}

impl AuthCoordinator {
    /// Create a coordinator with no secret.
    ///
    /// `wait_timeout` bounds how long a caller waits on an in-flight exchange;
    /// `None` waits until the exchange resolves.
    #[must_use]
    pub fn new(
        exchange: Arc<dyn TokenExchange>,
        notifier: Arc<dyn HostNotifier>,
        wait_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoordinatorState {
                    credential: None,
                    phase: AuthPhase::Idle,
                    waiters: Vec::new(),
                    epoch: 0,
                    exchanges: 0,
                }),
                exchange,
                notifier,
                wait_timeout,
            }),
        }
    }

    /// Install a new long-lived secret. Clears any revocation.
    pub fn set_secret(&self, secret: impl Into<String>) {
        self.install(SessionCredential::new(secret));
    }

    /// Install a secret together with a previously issued token.
    pub fn restore(&self, secret: impl Into<String>, token: SessionToken) {
        self.install(SessionCredential::new(secret).with_token(token));
    }

    /// Forget the secret. Queued callers fail with [`AuthError::NoSecret`].
    pub fn clear_secret(&self) {
        let waiters = {
            let mut state = self.inner.lock();
            state.epoch += 1;
            state.credential = None;
            if state.phase == AuthPhase::Revoked {
                state.phase = AuthPhase::Idle;
            }
            std::mem::take(&mut state.waiters)
        };
        info!(released = waiters.len(), "Access secret cleared");
        release(waiters, &Err(AuthError::NoSecret));
    }

    /// The current token, without waiting.
    #[must_use]
    pub fn current_token(&self) -> Option<SessionToken> {
        let state = self.inner.lock();
        if state.phase == AuthPhase::Refreshing {
            return None;
        }
        state
            .credential
            .as_ref()
            .and_then(SessionCredential::token)
            .cloned()
    }

    /// Snapshot of the coordinator state.
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        let state = self.inner.lock();
        AuthStatus {
            phase: state.phase,
            has_secret: state.credential.is_some(),
            token_issued_at: state.credential.as_ref().and_then(SessionCredential::issued_at),
            waiters: state.waiters.len(),
            exchanges: state.exchanges,
        }
    }

    /// Obtain a usable token, waiting on an exchange if necessary.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NoSecret`] when no secret is installed
    /// - [`AuthError::CredentialRevoked`] after a failed exchange
    /// - the exchange's own error when the exchange this call waited on failed
    /// - [`AuthError::WaitTimedOut`] when the configured wait bound elapses
    pub async fn ensure_valid(&self) -> RefreshOutcome {
        let receiver = {
            let mut state = self.inner.lock();
            match state.phase {
                AuthPhase::Revoked => return Err(AuthError::CredentialRevoked),
                AuthPhase::Refreshing => enqueue(&mut state),
                AuthPhase::Idle => {
                    let credential = state.credential.as_ref().ok_or(AuthError::NoSecret)?;
                    if let Some(token) = credential.token() {
                        return Ok(token.clone());
                    }
                    let receiver = enqueue(&mut state);
                    Inner::start_refresh(&self.inner, &mut state);
                    receiver
                }
            }
        };
        self.await_outcome(receiver).await
    }

    /// Report that `rejected` was refused by the backend.
    ///
    /// Starts an exchange unless one is already running. Reports about a token
    /// that has since been replaced are ignored, so many callers failing with
    /// the same token trigger a single exchange.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn invalidate(&self, rejected: &SessionToken) {
        let mut state = self.inner.lock();
        if state.phase != AuthPhase::Idle {
            debug!(phase = ?state.phase, "Invalidation absorbed by current phase");
            return;
        }
        let Some(credential) = state.credential.as_ref() else {
            return;
        };
        if credential.token().is_some_and(|current| current != rejected) {
            debug!("Ignoring invalidation of a token that was already replaced");
            return;
        }

        let cleared = credential.without_token();
        state.credential = Some(cleared);
        info!("Session token rejected by backend");
        Inner::start_refresh(&self.inner, &mut state);
    }

    async fn await_outcome(&self, receiver: oneshot::Receiver<RefreshOutcome>) -> RefreshOutcome {
        let received = match self.inner.wait_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "Gave up waiting for credential refresh");
                    return Err(AuthError::WaitTimedOut(limit));
                }
            },
            None => receiver.await,
        };
        received.unwrap_or(Err(AuthError::RefreshAbandoned))
    }

    fn install(&self, credential: SessionCredential) {
        let mut state = self.inner.lock();
        state.epoch += 1;
        let has_token = credential.token().is_some();
        state.credential = Some(credential);
        // An in-flight exchange keeps the phase; its result is discarded on arrival.
        if state.phase == AuthPhase::Revoked {
            state.phase = AuthPhase::Idle;
        }
        info!(has_token, phase = ?state.phase, "Access secret installed");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller holds the lock and has checked that no exchange is running.
    fn start_refresh(inner: &Arc<Self>, state: &mut CoordinatorState) {
        let Some(credential) = state.credential.as_ref() else {
            return;
        };
        let secret = credential.raw_secret().to_string();
        let epoch = state.epoch;
        state.phase = AuthPhase::Refreshing;
        state.exchanges += 1;
        info!(exchange = state.exchanges, "Starting credential exchange");

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let exchange = Arc::clone(&inner.exchange);
            let outcome = match tokio::spawn(async move { exchange.exchange(&secret).await }).await {
                Ok(outcome) => outcome,
                Err(e) => Err(AuthError::ExchangeFailed(format!("exchange task failed: {e}"))),
            };
            Self::complete_refresh(&inner, epoch, outcome);
        });
    }

    fn complete_refresh(inner: &Arc<Self>, epoch: u64, outcome: RefreshOutcome) {
        let (waiters, released, revoked) = {
            let mut state = inner.lock();

            if state.epoch != epoch {
                debug!("Discarding exchange result for a replaced secret");
                let current = state.credential.as_ref().map(|c| c.token().cloned());
                let released = match current {
                    Some(None) => {
                        // Waiters stay queued on the next exchange.
                        Self::start_refresh(inner, &mut state);
                        return;
                    }
                    Some(Some(token)) => Ok(token),
                    None => Err(AuthError::NoSecret),
                };
                state.phase = AuthPhase::Idle;
                (std::mem::take(&mut state.waiters), released, None)
            } else {
                let waiters = std::mem::take(&mut state.waiters);
                match outcome {
                    Ok(token) => {
                        state.credential = state
                            .credential
                            .as_ref()
                            .map(|c| c.with_token(token.clone()));
                        state.phase = AuthPhase::Idle;
                        info!(issued_at = %token.issued_at(), waiters = waiters.len(), "Credential refreshed");
                        (waiters, Ok(token), None)
                    }
                    Err(reason) => {
                        state.credential = state.credential.as_ref().map(SessionCredential::without_token);
                        state.phase = AuthPhase::Revoked;
                        warn!(%reason, waiters = waiters.len(), "Credential exchange failed");
                        (waiters, Err(reason.clone()), Some(reason))
                    }
                }
            }
        };

        release(waiters, &released);
        if let Some(reason) = revoked {
            inner.notifier.credential_invalid(&reason);
        }
    }
}

fn enqueue(state: &mut CoordinatorState) -> oneshot::Receiver<RefreshOutcome> {
    let (sender, receiver) = oneshot::channel();
    state.waiters.push(sender);
    receiver
}

fn release(waiters: Vec<oneshot::Sender<RefreshOutcome>>, outcome: &RefreshOutcome) {
    for waiter in waiters {
        // A waiter that timed out or was cancelled has dropped its receiver.
        let _ = waiter.send(outcome.clone());
    }
}

/// [`TokenExchange`] performed over a [`SyncLink`].
///
/// Posts `{"passphrase_submission": {"passkey": secret}}` to the token
/// endpoint and expects `{"data": {"jwt": ..., "issued_at": ...}}` back.
#[derive(Debug)]
pub struct LinkTokenExchange<L> {
    link: Arc<L>,
}

impl<L> LinkTokenExchange<L> {
    /// Exchange tokens over `link`.
    #[must_use]
    pub const fn new(link: Arc<L>) -> Self {
        Self { link }
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeEnvelope {
    data: Option<IssuedJwt>,
}

#[derive(Debug, Deserialize)]
struct IssuedJwt {
    jwt: String,
    issued_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl<L: SyncLink + 'static> TokenExchange for LinkTokenExchange<L> {
    async fn exchange(&self, secret: &str) -> RefreshOutcome {
        let request = OutboundRequest::post(
            endpoints::TOKEN_EXCHANGE,
            serde_json::json!({ "passphrase_submission": { "passkey": secret } }),
        );

        let response = self
            .link
            .send(&request, None)
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        match response.status {
            400 | 401 | 403 => return Err(AuthError::SecretRejected { status: response.status }),
            status if !response.is_success() => {
                return Err(AuthError::ExchangeFailed(format!("unexpected status {status}")));
            }
            _ => {}
        }

        let envelope: ExchangeEnvelope = response
            .json()
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        let issued = envelope
            .data
            .ok_or_else(|| AuthError::MalformedResponse("missing 'data' object".to_string()))?;
        if issued.jwt.trim().is_empty() {
            return Err(AuthError::MalformedResponse("empty token".to_string()));
        }

        Ok(SessionToken::new(
            issued.jwt,
            issued.issued_at.unwrap_or_else(Utc::now),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{TransportError, TransportResponse};
    use crate::testing::{wait_for_waiters, MockExchange, RecordingNotifier, ScriptedLink};

    fn coordinator(
        exchange: &Arc<MockExchange>,
        notifier: &Arc<RecordingNotifier>,
        wait_timeout: Option<Duration>,
    ) -> AuthCoordinator {
        AuthCoordinator::new(exchange.clone(), notifier.clone(), wait_timeout)
    }

    #[tokio::test]
    async fn test_no_secret_fails_fast() {
        let exchange = Arc::new(MockExchange::open());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);

        assert_eq!(auth.ensure_valid().await, Err(AuthError::NoSecret));
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_existing_token_returned_without_exchange() {
        let exchange = Arc::new(MockExchange::open());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);
        let token = SessionToken::new("restored", Utc::now());
        auth.restore("secret", token.clone());

        assert_eq!(auth.ensure_valid().await, Ok(token.clone()));
        assert_eq!(auth.current_token(), Some(token));
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_exchange() {
        let exchange = Arc::new(MockExchange::gated());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);
        auth.set_secret("secret");

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let auth = auth.clone();
                tokio::spawn(async move { auth.ensure_valid().await })
            })
            .collect();

        wait_for_waiters(&auth, 8).await;
        assert_eq!(auth.status().phase, AuthPhase::Refreshing);
        exchange.release(1);

        let mut tokens = Vec::new();
        for caller in callers {
            tokens.push(caller.await.unwrap().unwrap());
        }
        assert_eq!(exchange.calls(), 1);
        assert!(tokens.iter().all(|t| t == &tokens[0]));
        assert_eq!(auth.current_token(), Some(tokens[0].clone()));
        assert_eq!(auth.status().exchanges, 1);
    }

    #[tokio::test]
    async fn test_failed_exchange_releases_all_and_notifies_once() {
        let exchange = Arc::new(MockExchange::gated());
        exchange.push_result(Err(AuthError::SecretRejected { status: 401 }));
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);
        auth.restore("secret", SessionToken::new("stale", Utc::now()));
        let stale = auth.current_token().unwrap();

        let callers: Vec<_> = (0..3)
            .map(|_| {
                let auth = auth.clone();
                let stale = stale.clone();
                tokio::spawn(async move {
                    auth.invalidate(&stale);
                    auth.ensure_valid().await
                })
            })
            .collect();

        wait_for_waiters(&auth, 3).await;
        exchange.release(1);

        for caller in callers {
            assert_eq!(
                caller.await.unwrap(),
                Err(AuthError::SecretRejected { status: 401 })
            );
        }
        assert_eq!(exchange.calls(), 1);
        assert_eq!(notifier.invalid_count(), 1);
        assert_eq!(auth.status().phase, AuthPhase::Revoked);

        // Revoked: fail fast, no new exchange, no second notification.
        assert_eq!(auth.ensure_valid().await, Err(AuthError::CredentialRevoked));
        auth.invalidate(&stale);
        assert_eq!(exchange.calls(), 1);
        assert_eq!(notifier.invalid_count(), 1);
    }

    #[tokio::test]
    async fn test_new_secret_recovers_from_revocation() {
        let exchange = Arc::new(MockExchange::open());
        exchange.push_result(Err(AuthError::ExchangeFailed("offline".into())));
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);

        auth.set_secret("first");
        assert!(auth.ensure_valid().await.is_err());
        assert_eq!(auth.status().phase, AuthPhase::Revoked);

        auth.set_secret("second");
        let token = auth.ensure_valid().await.unwrap();
        assert_eq!(token.value(), "token-2");
        assert_eq!(exchange.secrets(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_stale_invalidation_is_ignored() {
        let exchange = Arc::new(MockExchange::open());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);
        auth.restore("secret", SessionToken::new("old", Utc::now()));
        let old = auth.current_token().unwrap();

        auth.invalidate(&old);
        let fresh = auth.ensure_valid().await.unwrap();
        assert_eq!(fresh.value(), "token-1");

        // A late report about the old token must not trigger another exchange.
        auth.invalidate(&old);
        assert_eq!(auth.ensure_valid().await.unwrap(), fresh);
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test]
    async fn test_wait_timeout_leaves_refresh_running() {
        let exchange = Arc::new(MockExchange::gated());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, Some(Duration::from_millis(50)));
        auth.set_secret("secret");

        assert_eq!(
            auth.ensure_valid().await,
            Err(AuthError::WaitTimedOut(Duration::from_millis(50)))
        );
        assert_eq!(auth.status().phase, AuthPhase::Refreshing);

        exchange.release(1);
        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.ensure_valid().await })
        };
        assert_eq!(waiter.await.unwrap().unwrap().value(), "token-1");
        assert_eq!(exchange.calls(), 1);
        assert_eq!(notifier.invalid_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_disturb_others() {
        let exchange = Arc::new(MockExchange::gated());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);
        auth.set_secret("secret");

        let abandoned = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.ensure_valid().await })
        };
        let patient = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.ensure_valid().await })
        };
        wait_for_waiters(&auth, 2).await;
        abandoned.abort();

        exchange.release(1);
        assert_eq!(patient.await.unwrap().unwrap().value(), "token-1");
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test]
    async fn test_secret_replaced_mid_exchange_runs_next_exchange() {
        let exchange = Arc::new(MockExchange::gated());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);
        auth.set_secret("old-secret");

        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.ensure_valid().await })
        };
        wait_for_waiters(&auth, 1).await;

        auth.set_secret("new-secret");
        exchange.release(2);

        let token = waiter.await.unwrap().unwrap();
        assert_eq!(token.value(), "token-2");
        assert_eq!(exchange.secrets(), vec!["old-secret", "new-secret"]);
        assert_eq!(auth.status().phase, AuthPhase::Idle);
    }

    #[tokio::test]
    async fn test_clear_secret_releases_waiters() {
        let exchange = Arc::new(MockExchange::gated());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = coordinator(&exchange, &notifier, None);
        auth.set_secret("secret");

        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.ensure_valid().await })
        };
        wait_for_waiters(&auth, 1).await;
        auth.clear_secret();

        assert_eq!(waiter.await.unwrap(), Err(AuthError::NoSecret));
        exchange.release(1);
        assert!(!auth.status().has_secret);
    }

    #[tokio::test]
    async fn test_link_exchange_success() {
        let link = Arc::new(ScriptedLink::new(|_, _| {
            Ok(TransportResponse::new(
                200,
                br#"{"data": {"jwt": "signed.jwt.value", "issued_at": "2025-01-15T03:30:00Z"}}"#.to_vec(),
            ))
        }));
        let exchange = LinkTokenExchange::new(link.clone());

        let token = exchange.exchange("passkey-1").await.unwrap();
        assert_eq!(token.value(), "signed.jwt.value");
        assert_eq!(token.issued_at().to_rfc3339(), "2025-01-15T03:30:00+00:00");

        let sent = link.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.endpoint, endpoints::TOKEN_EXCHANGE);
        assert_eq!(sent[0].1, None);
        assert_eq!(
            sent[0].0.body["passphrase_submission"]["passkey"],
            "passkey-1"
        );
    }

    #[tokio::test]
    async fn test_link_exchange_failures() {
        let rejected = LinkTokenExchange::new(Arc::new(ScriptedLink::new(|_, _| {
            Ok(TransportResponse::new(403, Vec::new()))
        })));
        assert_eq!(
            rejected.exchange("x").await,
            Err(AuthError::SecretRejected { status: 403 })
        );

        let server_error = LinkTokenExchange::new(Arc::new(ScriptedLink::new(|_, _| {
            Ok(TransportResponse::new(502, Vec::new()))
        })));
        assert!(matches!(
            server_error.exchange("x").await,
            Err(AuthError::ExchangeFailed(_))
        ));

        let garbage = LinkTokenExchange::new(Arc::new(ScriptedLink::new(|_, _| {
            Ok(TransportResponse::new(200, b"<html>".to_vec()))
        })));
        assert!(matches!(
            garbage.exchange("x").await,
            Err(AuthError::MalformedResponse(_))
        ));

        let empty = LinkTokenExchange::new(Arc::new(ScriptedLink::new(|_, _| {
            Ok(TransportResponse::new(200, br#"{"data": {"jwt": ""}}"#.to_vec()))
        })));
        assert!(matches!(
            empty.exchange("x").await,
            Err(AuthError::MalformedResponse(_))
        ));

        let offline = LinkTokenExchange::new(Arc::new(ScriptedLink::new(|_, _| {
            Err(TransportError::Timeout)
        })));
        assert!(matches!(
            offline.exchange("x").await,
            Err(AuthError::ExchangeFailed(_))
        ));
    }

    #[test]
    fn test_terminal_errors() {
        assert!(AuthError::CredentialRevoked.is_terminal());
        assert!(AuthError::SecretRejected { status: 401 }.is_terminal());
        assert!(AuthError::ExchangeFailed("x".into()).is_terminal());
        assert!(AuthError::MalformedResponse("x".into()).is_terminal());
        assert!(!AuthError::WaitTimedOut(Duration::from_secs(1)).is_terminal());
        assert!(!AuthError::RefreshAbandoned.is_terminal());
        assert!(!AuthError::NoSecret.is_terminal());
    }

    #[test]
    fn test_wait_timeout_message_keeps_sub_second_bound() {
        let message = AuthError::WaitTimedOut(Duration::from_millis(250)).to_string();
        assert_eq!(message, "Timed out after 250ms waiting for credential refresh");
    }
}
