//! Mock authenticator for testing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::api::{AccessToken, ApiError, Authenticator};
use crate::session::{Credentials, Session};

/// Mock implementation of the Authenticator trait.
///
/// Logins hand out `token-1`, `token-2`, ...; refreshes hand out
/// `refreshed-1`, `refreshed-2`, ... Refresh tokens are only issued when
/// built with [`with_refresh_support`](Self::with_refresh_support).
#[derive(Debug, Default)]
pub struct MockAuthenticator {
    supports_refresh: bool,
    logins: AtomicU32,
    refreshes: AtomicU32,
    reject_logins: AtomicBool,
    fail_refreshes: AtomicBool,
    session_lifetime: Mutex<Option<chrono::Duration>>,
    identities: Mutex<Vec<String>>,
}

impl MockAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue refresh tokens and accept them on the refresh endpoint.
    pub fn with_refresh_support(mut self) -> Self {
        self.supports_refresh = true;
        self
    }

    pub fn login_count(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Identities seen by `login`, in call order.
    pub fn identities(&self) -> Vec<String> {
        self.identities
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Make every login fail as if the credentials were wrong.
    pub fn reject_logins(&self, reject: bool) {
        self.reject_logins.store(reject, Ordering::SeqCst);
    }

    /// Make every refresh fail, forcing the login fallback.
    pub fn fail_refreshes(&self, fail: bool) {
        self.fail_refreshes.store(fail, Ordering::SeqCst);
    }

    /// Give new sessions a known expiry `lifetime` from now.
    pub fn set_session_lifetime(&self, lifetime: chrono::Duration) {
        if let Ok(mut slot) = self.session_lifetime.lock() {
            *slot = Some(lifetime);
        }
    }

    fn build_session(&self, access_token: String, n: u32) -> Session {
        let mut session = Session::new(AccessToken::new(access_token));
        if self.supports_refresh {
            session = session.with_refresh_token(format!("refresh-{}", n));
        }
        let lifetime = self.session_lifetime.lock().ok().and_then(|slot| *slot);
        if let Some(lifetime) = lifetime {
            session = session.with_expires_at(Utc::now() + lifetime);
        }
        session
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        if let Ok(mut ids) = self.identities.lock() {
            ids.push(credentials.identity.clone());
        }
        if self.reject_logins.load(Ordering::SeqCst) {
            return Err(ApiError::AuthenticationFailed(
                "no active account found with the given credentials".to_string(),
            ));
        }

        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.build_session(format!("token-{}", n), n))
    }

    async fn refresh(&self, session: &Session) -> Result<Option<Session>, ApiError> {
        if !self.supports_refresh || session.refresh_token.is_none() {
            return Ok(None);
        }

        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_refreshes.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized("refresh token expired".to_string()));
        }
        Ok(Some(self.build_session(format!("refreshed-{}", n), n)))
    }
}
