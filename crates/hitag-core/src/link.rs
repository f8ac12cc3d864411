//! Transport boundary to the backend.
//!
//! [`SyncLink`] is the only way the crate talks to the network. The core
//! supplies an endpoint path, a JSON body and the authorization header value;
//! every backend call is a `POST`. The link returns status, headers and raw
//! body.
//! [`HttpSyncLink`] is the reqwest-backed implementation used by the daemon.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ApiConfig;
use crate::error::Result;

/// Backend endpoint paths used by the core.
pub mod endpoints {
    /// Exchange the long-lived secret for a session token.
    pub const TOKEN_EXCHANGE: &str = "/iam/users/tokens";

    /// Upload presence scan records.
    pub const SCAN_RECORD: &str = "/iot/scan_record";
}

/// Status the backend uses for a rejected session token.
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// An outbound call, described independently of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Path relative to the backend base URL, e.g. `/iot/scan_record`.
    pub endpoint: String,

    /// JSON body.
    pub body: serde_json::Value,
}

impl OutboundRequest {
    /// A `POST` request carrying `body`.
    #[must_use]
    pub fn post(endpoint: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            body,
        }
    }
}

/// Raw response handed back to callers; decoding is theirs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response headers, names lowercased.
    pub headers: Vec<(String, String)>,

    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// A response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Whether the backend rejected the session token.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        self.status == STATUS_UNAUTHORIZED
    }

    /// First header value named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the decoder error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Failures below the HTTP status level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be delivered or the response not read.
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the transport deadline.
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether retrying later could succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Transport used by the request pipeline.
#[async_trait]
pub trait SyncLink: Send + Sync {
    /// Deliver `request`, sending `authorization` as the `Authorization`
    /// header when present.
    async fn send(
        &self,
        request: &OutboundRequest,
        authorization: Option<&str>,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: SyncLink + ?Sized> SyncLink for Box<T> {
    async fn send(
        &self,
        request: &OutboundRequest,
        authorization: Option<&str>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        (**self).send(request, authorization).await
    }
}

/// reqwest-backed [`SyncLink`].
#[derive(Debug, Clone)]
pub struct HttpSyncLink {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSyncLink {
    /// Create a link rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> std::result::Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hitag/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
        })
    }

    /// Create a link from the `[api]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        let link = Self::new(api.base_url()?, api.request_timeout())?;
        Ok(link)
    }

    /// The base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, endpoint: &str) -> std::result::Result<Url, TransportError> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidRequest(format!("{endpoint}: {e}")))
    }
}

#[async_trait]
impl SyncLink for HttpSyncLink {
    #[instrument(skip(self, request, authorization), fields(endpoint = %request.endpoint))]
    async fn send(
        &self,
        request: &OutboundRequest,
        authorization: Option<&str>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let url = self.url_for(&request.endpoint)?;
        let mut builder = self.client.post(url).json(&request.body);
        if let Some(value) = authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(status, bytes = body.len(), "Backend responded");
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
