//! Axum extractors for the session cookie.

use crate::directory::UserDirectory;
use crate::error::AppError;
use crate::session::{Session, SessionError, SessionManager};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Login service state shared across handlers.
#[derive(Clone)]
pub struct LoginState {
    pub sessions: Arc<SessionManager>,
    pub directory: Arc<dyn UserDirectory>,
    pub request_timeout: Duration,
    pub cookie_secure: bool,
}

impl LoginState {
    /// Deadline for collaborator calls made on behalf of one request.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.request_timeout
    }

    /// `Set-Cookie` value issuing `token` for `max_age`.
    pub fn session_cookie(&self, token: &str, max_age: chrono::Duration) -> Result<HeaderValue, AppError> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            max_age.num_seconds().max(0)
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::Internal(format!("Invalid session cookie: {}", e)))
    }

    /// `Set-Cookie` value removing the session cookie.
    pub fn clear_session_cookie(&self) -> HeaderValue {
        if self.cookie_secure {
            HeaderValue::from_static(
                "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Secure",
            )
        } else {
            HeaderValue::from_static(
                "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            )
        }
    }
}

/// Raw session token from the `session` cookie, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie(pub Option<String>);

impl<S> FromRequestParts<S> for SessionCookie
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(SessionCookie(token))
    }
}

/// The caller's session after lazy expiry and renewal.
///
/// - `session` is `Some` only for a live session (possibly just renewed).
/// - An expired or unreadable session found in the store is deleted and
///   reported through `cleared`, so the handler can drop the cookie.
#[derive(Debug)]
pub struct ResolvedSession {
    pub session: Option<Session>,
    pub renewed: bool,
    pub cleared: bool,
}

impl FromRequestParts<LoginState> for ResolvedSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &LoginState,
    ) -> Result<Self, Self::Rejection> {
        let SessionCookie(token) = match SessionCookie::from_request_parts(parts, state).await {
            Ok(cookie) => cookie,
            Err(never) => match never {},
        };

        let none = ResolvedSession {
            session: None,
            renewed: false,
            cleared: false,
        };
        let Some(token) = token else {
            return Ok(none);
        };

        let cleared = ResolvedSession {
            session: None,
            renewed: false,
            cleared: true,
        };

        let deadline = state.deadline();
        let mut session = match state.sessions.get_session(&token, deadline).await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(none),
            Err(SessionError::CorruptSession(e)) => {
                tracing::error!(action = "corrupt_session", error = %e, "Discarding unreadable session record");
                discard_session(state, &token, deadline).await;
                return Ok(cleared);
            }
            Err(e) => return Err(e.into()),
        };

        let status = state.sessions.evaluate_and_renew(&mut session, deadline).await;
        if status.still_valid {
            return Ok(ResolvedSession {
                session: Some(session),
                renewed: status.renewed,
                cleared: false,
            });
        }

        // Replay of an expired session: remove it for good.
        tracing::info!(action = "expired_session", user_id = session.user_id, "Session expired");
        discard_session(state, &token, deadline).await;
        Ok(cleared)
    }
}

/// Delete a session the caller can no longer use. Failure is logged, not returned.
async fn discard_session(state: &LoginState, token: &str, deadline: Instant) {
    match state.sessions.delete_session(token, deadline).await {
        Ok(()) => tracing::info!(action = "session_discarded", "Unusable session deleted"),
        Err(e) => {
            tracing::error!(action = "session_discard_failed", error = %e, "Could not delete unusable session")
        }
    }
}

/// Live session extractor.
///
/// Returns 401 Unauthorized if there is no live session. When the cookie
/// named a session that was just discarded, the 401 also clears the cookie.
#[derive(Debug)]
pub struct LiveSession {
    pub session: Session,
    pub renewed: bool,
}

/// Rejection for [`LiveSession`].
#[derive(Debug)]
pub struct SessionRejection {
    pub error: AppError,
    pub clear_cookie: Option<HeaderValue>,
}

impl From<AppError> for SessionRejection {
    fn from(error: AppError) -> Self {
        Self {
            error,
            clear_cookie: None,
        }
    }
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        match self.clear_cookie {
            Some(cookie) => ([(header::SET_COOKIE, cookie)], self.error).into_response(),
            None => self.error.into_response(),
        }
    }
}

impl FromRequestParts<LoginState> for LiveSession {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &LoginState,
    ) -> Result<Self, Self::Rejection> {
        let resolved = ResolvedSession::from_request_parts(parts, state).await?;
        match resolved.session {
            Some(session) => Ok(LiveSession {
                session,
                renewed: resolved.renewed,
            }),
            None => Err(SessionRejection {
                error: AppError::Unauthenticated,
                clear_cookie: resolved.cleared.then(|| state.clear_session_cookie()),
            }),
        }
    }
}
