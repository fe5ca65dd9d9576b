//! Error types and Axum response conversions.

use crate::directory::DirectoryError;
use crate::policy::PolicyError;
use crate::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Corrupt session: {0}")]
    CorruptSession(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Not logged in")]
    Unauthenticated,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Already logged in")]
    AlreadyLoggedIn,

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: StatusCode, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::AlreadyLoggedIn => StatusCode::CONFLICT,
            AppError::Upstream { status, .. } => *status,
            AppError::StoreUnavailable(_)
            | AppError::CorruptSession(_)
            | AppError::Evaluation(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::StoreUnavailable(_)
            | AppError::CorruptSession(_)
            | AppError::Evaluation(_)
            | AppError::Internal(_) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %self, "Internal server error");
                "Internal server error".to_string()
            }
            AppError::Upstream { status, message } if status.is_server_error() => {
                tracing::error!(%status, error = %message, "Upstream server error");
                "Internal server error".to_string()
            }
            AppError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::StoreUnavailable(msg) => AppError::StoreUnavailable(msg),
            SessionError::CorruptSession(msg) => AppError::CorruptSession(msg),
        }
    }
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::InvalidInput(msg) => AppError::InvalidInput(msg),
            PolicyError::Evaluation(msg) => AppError::Evaluation(msg),
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Api(body) => AppError::Upstream {
                status: body.status(),
                message: body.message,
            },
            DirectoryError::Unavailable(msg) => AppError::Internal(format!("Users API: {}", msg)),
        }
    }
}
