//! Credential and session types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::api::AccessToken;

/// Login credentials. Only ever used to obtain a [`Session`].
#[derive(Clone)]
pub struct Credentials {
    /// Account identity (e-mail address for Octopod).
    pub identity: String,
    secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: AccessToken,
    /// Token for the refresh endpoint, when the backend issues one.
    pub refresh_token: Option<String>,
    pub obtained_at: DateTime<Utc>,
    /// Expiry of the access token, if known.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(access_token: AccessToken) -> Self {
        Self {
            access_token,
            refresh_token: None,
            obtained_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the token is known to expire within `skew` of `now`.
    ///
    /// Sessions with unknown expiry are never considered expired here; the
    /// remote service tells us instead.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + skew >= expires_at,
            None => false,
        }
    }
}
