//! Client for the users API, used to resolve a username at login.
//!
//! The users API answers `GET /users/username/{name}` with the account record
//! on 200, or with an error body `{"code": .., "message": ..}` otherwise.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Account record as returned by the users API. Only the fields login needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub base64_password_hash: Option<String>,
    #[serde(default)]
    pub base64_salt: Option<String>,
}

/// Error body returned by the users API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: i32,
    pub message: String,
}

/// Users API error code for an unknown user.
pub const CODE_USER_NOT_FOUND: i32 = 404;
/// Users API error code for an internal failure.
pub const CODE_INTERNAL_SERVER_ERROR: i32 = 500;

const CODE_USERNAME_ALREADY_EXISTS: i32 = 12;
const CODE_EMAIL_ALREADY_EXISTS: i32 = 13;
const LAST_VALIDATION_CODE: i32 = 23;

impl ApiErrorBody {
    /// HTTP status for a users API error code.
    ///
    /// Codes 1..=23 are request validation failures except the two
    /// "already exists" conflicts.
    pub fn status(&self) -> StatusCode {
        match self.code {
            CODE_USERNAME_ALREADY_EXISTS | CODE_EMAIL_ALREADY_EXISTS => StatusCode::CONFLICT,
            1..=LAST_VALIDATION_CODE => StatusCode::BAD_REQUEST,
            CODE_USER_NOT_FOUND => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == CODE_USER_NOT_FOUND
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The users API answered with a typed error.
    #[error("Users API error {}: {}", .0.code, .0.message)]
    Api(ApiErrorBody),

    /// The users API could not be reached or answered with garbage.
    #[error("Users API unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_by_username(&self, username: &str) -> Result<User, DirectoryError>;
}

/// [`UserDirectory`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn user_url(&self, username: &str) -> Result<reqwest::Url, DirectoryError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| DirectoryError::Unavailable(format!("invalid users API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Unavailable("users API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["users", "username", username]);
        Ok(url)
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn get_user_by_username(&self, username: &str) -> Result<User, DirectoryError> {
        let url = self.user_url(username)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if status != reqwest::StatusCode::OK {
            let error: ApiErrorBody = serde_json::from_slice(&body).map_err(|_| {
                DirectoryError::Unavailable(format!("unexpected {} from users API", status))
            })?;
            return Err(DirectoryError::Api(error));
        }

        serde_json::from_slice(&body)
            .map_err(|e| DirectoryError::Unavailable(format!("invalid user record: {}", e)))
    }
}
