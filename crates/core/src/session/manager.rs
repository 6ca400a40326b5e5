//! Session ownership and transparent re-authentication.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{AccessToken, ApiError, Authenticator};

use super::{Credentials, Session};

/// Renew sessions this long before their reported expiry.
const EXPIRY_SKEW_SECS: i64 = 30;

struct SessionState {
    session: Option<Session>,
    /// Bumped every time a new session is installed.
    generation: u64,
}

/// Owns the single authenticated session and wraps every remote call.
///
/// The session is created lazily on first use. When a wrapped call fails
/// with an auth-expired error the session is renewed once and the call is
/// replayed once; a second rejection is reported as
/// [`ApiError::AuthenticationFailed`]. Renewal runs under a mutex, and a
/// generation counter lets calls that raced a renewal reuse the new token
/// instead of re-authenticating again.
pub struct SessionManager {
    authenticator: Arc<dyn Authenticator>,
    credentials: Credentials,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(authenticator: Arc<dyn Authenticator>, credentials: Credentials) -> Self {
        Self {
            authenticator,
            credentials,
            state: Mutex::new(SessionState {
                session: None,
                generation: 0,
            }),
        }
    }

    /// Run `operation` with a valid access token.
    ///
    /// Non-auth errors are returned unchanged.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ApiError>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let (token, generation) = self.current_token().await?;

        match operation(token).await {
            Err(err) if self.authenticator.is_expired_error(&err) => {
                warn!(generation, "Session token rejected ({}), re-authenticating", err);
                let token = self.renew(generation).await?;

                match operation(token).await {
                    Err(err) if self.authenticator.is_expired_error(&err) => {
                        Err(ApiError::AuthenticationFailed(format!(
                            "token still rejected after re-authentication: {}",
                            err
                        )))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Drop the current session; the next call logs in again.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.session = None;
    }

    /// Number of sessions installed so far (first login included).
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Token of the current session, logging in or renewing if needed.
    async fn current_token(&self) -> Result<(AccessToken, u64), ApiError> {
        let mut state = self.state.lock().await;

        let usable = match &state.session {
            Some(session) => {
                !session.is_expired_at(Utc::now(), chrono::Duration::seconds(EXPIRY_SKEW_SECS))
            }
            None => false,
        };

        if !usable {
            if state.session.is_some() {
                debug!("Session past its expiry, renewing before dispatch");
            }
            self.install_new_session(&mut state).await?;
        }

        let token = Self::token_of(&state)?;
        Ok((token, state.generation))
    }

    /// Renew after a rejection observed with the token of generation `seen`.
    async fn renew(&self, seen: u64) -> Result<AccessToken, ApiError> {
        let mut state = self.state.lock().await;

        if state.generation != seen && state.session.is_some() {
            debug!(
                seen,
                current = state.generation,
                "Session already renewed by a concurrent call"
            );
            return Self::token_of(&state);
        }

        self.install_new_session(&mut state).await?;
        Self::token_of(&state)
    }

    /// Refresh the session if possible, otherwise log in from credentials.
    ///
    /// Must be called with the state lock held.
    async fn install_new_session(&self, state: &mut SessionState) -> Result<(), ApiError> {
        let refreshed = match &state.session {
            Some(old) if old.refresh_token.is_some() => {
                match self.authenticator.refresh(old).await {
                    Ok(session) => session,
                    Err(e) => {
                        warn!("Token refresh failed ({}), falling back to full login", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let session = match refreshed {
            Some(session) => session,
            None => match self.authenticator.login(&self.credentials).await {
                Ok(session) => session,
                Err(e) => {
                    state.session = None;
                    return Err(e);
                }
            },
        };

        state.session = Some(session);
        state.generation += 1;
        info!(
            generation = state.generation,
            identity = %self.credentials.identity,
            "Authenticated session established"
        );
        Ok(())
    }

    fn token_of(state: &SessionState) -> Result<AccessToken, ApiError> {
        state
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or_else(|| ApiError::AuthenticationFailed("no active session".to_string()))
    }
}
