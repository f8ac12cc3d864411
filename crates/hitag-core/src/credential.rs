//! Session credentials.
//!
//! A [`SessionCredential`] pairs the host-supplied long-lived secret with the
//! short-lived token obtained by exchanging it. Both are immutable values;
//! a refresh produces a new credential rather than mutating the old one.

use std::fmt;

use chrono::{DateTime, Utc};

/// A short-lived signed session token.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
    issued_at: DateTime<Utc>,
}

impl SessionToken {
    /// Wrap a token string issued at `issued_at`.
    #[must_use]
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            issued_at,
        }
    }

    /// The raw token string.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the backend issued the token.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// The long-lived secret plus the token currently issued for it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    raw_secret: String,
    token: Option<SessionToken>,
}

impl SessionCredential {
    /// A credential with no token issued yet.
    #[must_use]
    pub fn new(raw_secret: impl Into<String>) -> Self {
        Self {
            raw_secret: raw_secret.into(),
            token: None,
        }
    }

    /// The secret that tokens are exchanged from.
    #[must_use]
    pub fn raw_secret(&self) -> &str {
        &self.raw_secret
    }

    /// The issued token, if any.
    #[must_use]
    pub const fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    /// When the current token was issued.
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.token.as_ref().map(SessionToken::issued_at)
    }

    /// The same secret carrying `token`.
    #[must_use]
    pub fn with_token(&self, token: SessionToken) -> Self {
        Self {
            raw_secret: self.raw_secret.clone(),
            token: Some(token),
        }
    }

    /// The same secret with its token discarded.
    #[must_use]
    pub fn without_token(&self) -> Self {
        Self::new(self.raw_secret.clone())
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("raw_secret", &"<redacted>")
            .field("token", &self.token)
            .finish()
    }
}
