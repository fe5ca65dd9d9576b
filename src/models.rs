//! Request and response models for the login API.
//!
//! All models use serde for serialization/deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login form (`application/x-www-form-urlencoded`).
#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub login_username: String,
    #[serde(default)]
    pub login_password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("login_username", &self.login_username)
            .field("login_password", &"[REDACTED]")
            .finish()
    }
}

/// Response after a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub expiration: DateTime<Utc>,
}

/// Response describing the caller's live session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub renewed: bool,
}
