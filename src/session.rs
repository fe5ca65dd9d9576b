//! Session lifecycle on top of the remote session store.
//!
//! The store is the only owner of session records; nothing is cached in
//! process. Expiry is evaluated when a session is read rather than by a
//! background sweeper, so an expired record stays in the store until it is
//! replayed (and then deleted) or the user logs out.
//!
//! Record layout (JSON, key = session id):
//!
//! ```json
//! {"created_at": "...", "user_id": 42, "expiration": "..."}
//! ```
//!
//! Every store call is bounded by the caller's deadline. Concurrent renewals
//! of one session race benignly: the last write wins and both writes extend
//! the expiration by the same window.

use crate::auth::token::generate_session_token;
use crate::clock::Clock;
use crate::storage::{KvStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;
use zeroize::Zeroizing;

/// Sessions with fewer whole days than this left are renewed on access.
pub const RENEWAL_THRESHOLD_DAYS: i64 = 3;

/// Extension applied to a renewed session, counted from the renewal time.
pub const RENEWAL_WINDOW_DAYS: i64 = 7;

/// Lifetime of a freshly created session.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// A live or expired login session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
}

impl Session {
    /// A session is live up to and including its expiration instant.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expiration
    }

    /// Whole days left before expiry, or -1 once expired.
    pub fn days_till_expiration(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_live_at(now) {
            return -1;
        }
        (self.expiration - now).num_days()
    }

    fn to_record(&self) -> StoredSession {
        StoredSession {
            created_at: self.created_at,
            user_id: self.user_id,
            expiration: self.expiration,
        }
    }
}

/// Session data as stored under its id.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    created_at: DateTime<Utc>,
    user_id: i64,
    expiration: DateTime<Utc>,
}

/// Tunables handed to the manager at construction.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub renewal_threshold_days: i64,
    pub renewal_window: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
            renewal_threshold_days: RENEWAL_THRESHOLD_DAYS,
            renewal_window: Duration::days(RENEWAL_WINDOW_DAYS),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Corrupt session record: {0}")]
    CorruptSession(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::StoreUnavailable(err.to_string())
    }
}

/// Outcome of [`SessionManager::evaluate_and_renew`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub still_valid: bool,
    pub renewed: bool,
}

/// Creates, reads, renews and deletes sessions.
pub struct SessionManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    span: tracing::Span,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, settings: SessionSettings) -> Self {
        let span = tracing::info_span!("session_manager");
        Self {
            store,
            clock,
            settings,
            span,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create and persist a new session for `user_id` living for `ttl`.
    pub async fn create_session(
        &self,
        user_id: i64,
        ttl: Duration,
        deadline: Instant,
    ) -> Result<Session, SessionError> {
        self.insert(user_id, ttl, deadline)
            .instrument(self.span.clone())
            .await
    }

    /// Look up a session by token.
    ///
    /// A missing key (or an empty token) is `Ok(None)`. Expired sessions are
    /// returned as-is; the caller decides via [`Self::evaluate_and_renew`].
    pub async fn get_session(
        &self,
        token: &str,
        deadline: Instant,
    ) -> Result<Option<Session>, SessionError> {
        if token.is_empty() {
            return Ok(None);
        }
        self.read(token, deadline)
            .instrument(self.span.clone())
            .await
    }

    /// Decide whether `session` is still usable and renew it when close to
    /// expiry.
    ///
    /// Expired sessions are left untouched (not deleted). A failed renewal
    /// write is logged and reported as `renewed: false`; the session keeps
    /// its original expiration and remains valid.
    pub async fn evaluate_and_renew(&self, session: &mut Session, deadline: Instant) -> SessionStatus {
        self.renew(session, deadline)
            .instrument(self.span.clone())
            .await
    }

    /// Remove a session. Deleting an unknown token succeeds.
    pub async fn delete_session(&self, token: &str, deadline: Instant) -> Result<(), SessionError> {
        if token.is_empty() {
            return Ok(());
        }
        self.remove(token, deadline)
            .instrument(self.span.clone())
            .await
    }

    async fn insert(
        &self,
        user_id: i64,
        ttl: Duration,
        deadline: Instant,
    ) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let session = Session {
            id: generate_session_token(),
            user_id,
            created_at: now,
            expiration: now + ttl,
        };

        self.write(&session, deadline).await?;
        tracing::info!(action = "session_created", user_id, expiration = %session.expiration, "Session created");
        Ok(session)
    }

    async fn read(&self, token: &str, deadline: Instant) -> Result<Option<Session>, SessionError> {
        let Some(raw) = bounded(deadline, self.store.get(token)).await? else {
            return Ok(None);
        };

        let raw = Zeroizing::new(raw);
        let record: StoredSession = serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(error = %e, "Session record could not be decoded");
            SessionError::CorruptSession(e.to_string())
        })?;

        Ok(Some(Session {
            id: token.to_string(),
            user_id: record.user_id,
            created_at: record.created_at,
            expiration: record.expiration,
        }))
    }

    async fn renew(&self, session: &mut Session, deadline: Instant) -> SessionStatus {
        let now = self.clock.now();
        if !session.is_live_at(now) {
            tracing::debug!(user_id = session.user_id, "Session expired");
            return SessionStatus {
                still_valid: false,
                renewed: false,
            };
        }

        let unchanged = SessionStatus {
            still_valid: true,
            renewed: false,
        };

        if session.days_till_expiration(now) >= self.settings.renewal_threshold_days {
            return unchanged;
        }

        let expiration = now + self.settings.renewal_window;
        if expiration <= session.expiration {
            return unchanged;
        }

        let renewed = Session {
            expiration,
            ..session.clone()
        };

        match self.write(&renewed, deadline).await {
            Ok(()) => {
                tracing::info!(action = "session_renewed", user_id = session.user_id, expiration = %expiration, "Session renewed");
                *session = renewed;
                SessionStatus {
                    still_valid: true,
                    renewed: true,
                }
            }
            Err(e) => {
                tracing::warn!(action = "session_renewal_failed", user_id = session.user_id, error = %e, "Could not renew session");
                unchanged
            }
        }
    }

    async fn remove(&self, token: &str, deadline: Instant) -> Result<(), SessionError> {
        bounded(deadline, self.store.delete(token)).await?;
        tracing::debug!(action = "session_deleted", "Session deleted");
        Ok(())
    }

    async fn write(&self, session: &Session, deadline: Instant) -> Result<(), SessionError> {
        let json = Zeroizing::new(
            serde_json::to_string(&session.to_record())
                .map_err(|e| SessionError::CorruptSession(e.to_string()))?,
        );
        bounded(deadline, self.store.put(&session.id, &json)).await
    }
}

/// Run a store call, mapping both store failures and deadline expiry to
/// [`SessionError::StoreUnavailable`].
async fn bounded<T, F>(deadline: Instant, call: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result.map_err(SessionError::from),
        Err(_) => Err(SessionError::StoreUnavailable(
            "deadline exceeded".to_string(),
        )),
    }
}
