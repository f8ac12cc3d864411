//! Authenticated request execution.
//!
//! Every outbound call obtains a token from the [`AuthCoordinator`], goes out
//! through the [`SyncLink`], and, if the backend rejects the token, is retried
//! exactly once after a coordinated refresh. Nothing else is retried.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::auth::{AuthCoordinator, AuthError, HostNotifier};
use crate::credential::SessionToken;
use crate::link::{OutboundRequest, SyncLink, TransportError, TransportResponse};

/// Failures of [`RequestPipeline::execute`].
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// No token could be obtained; nothing was sent.
    #[error("No valid credential: {0}")]
    Credential(#[source] AuthError),

    /// The backend rejected the token and the refresh-and-retry did not help.
    #[error("Request rejected as unauthorized (status {})", .response.status)]
    Unauthorized {
        /// The rejecting response (the retry's, if a retry was sent).
        response: TransportResponse,
        /// Why the refresh failed, when it did.
        refresh_error: Option<AuthError>,
    },

    /// The backend answered with a non-success status other than 401.
    #[error("Backend returned status {}", .0.status)]
    Status(TransportResponse),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PipelineError {
    /// HTTP status involved, if the backend answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { response, .. } | Self::Status(response) => Some(response.status),
            Self::Credential(_) | Self::Transport(_) => None,
        }
    }

    /// Whether this is a credential problem rather than a transport or server one.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Credential(_) | Self::Unauthorized { .. })
    }
}

/// Executes requests with the current credential attached.
pub struct RequestPipeline<L> {
    link: Arc<L>,
    auth: AuthCoordinator,
    notifier: Arc<dyn HostNotifier>,
}

impl<L> std::fmt::Debug for RequestPipeline<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl<L: SyncLink> RequestPipeline<L> {
    /// Create a pipeline sending through `link`.
    #[must_use]
    pub fn new(link: Arc<L>, auth: AuthCoordinator, notifier: Arc<dyn HostNotifier>) -> Self {
        Self {
            link,
            auth,
            notifier,
        }
    }

    /// The coordinator this pipeline draws tokens from.
    #[must_use]
    pub const fn auth(&self) -> &AuthCoordinator {
        &self.auth
    }

    /// Send `request` and return the raw response.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Credential`] if no token is available
    /// - [`PipelineError::Unauthorized`] if the token is rejected and the
    ///   single refresh-and-retry does not succeed
    /// - [`PipelineError::Status`] for any other non-2xx answer
    /// - [`PipelineError::Transport`] for network failures
    #[instrument(skip_all, fields(endpoint = %request.endpoint))]
    pub async fn execute(
        &self,
        request: &OutboundRequest,
    ) -> Result<TransportResponse, PipelineError> {
        let result = self.execute_with_retry(request).await;
        if let Err(error) = &result {
            self.notifier.request_failed(error);
        }
        result
    }

    async fn execute_with_retry(
        &self,
        request: &OutboundRequest,
    ) -> Result<TransportResponse, PipelineError> {
        let token = self
            .auth
            .ensure_valid()
            .await
            .map_err(PipelineError::Credential)?;

        let response = self.send(request, &token).await?;
        if !response.is_auth_failure() {
            return into_result(response);
        }

        debug!("Session token rejected, refreshing before a single retry");
        self.auth.invalidate(&token);
        let fresh = match self.auth.ensure_valid().await {
            Ok(fresh) => fresh,
            Err(refresh_error) => {
                return Err(PipelineError::Unauthorized {
                    response,
                    refresh_error: Some(refresh_error),
                });
            }
        };

        let retried = self.send(request, &fresh).await?;
        if retried.is_auth_failure() {
            warn!("Retried request was rejected again");
            return Err(PipelineError::Unauthorized {
                response: retried,
                refresh_error: None,
            });
        }
        into_result(retried)
    }

    async fn send(
        &self,
        request: &OutboundRequest,
        token: &SessionToken,
    ) -> Result<TransportResponse, TransportError> {
        let header = token.authorization_header();
        self.link.send(request, Some(&header)).await
    }
}

fn into_result(response: TransportResponse) -> Result<TransportResponse, PipelineError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(PipelineError::Status(response))
    }
}
