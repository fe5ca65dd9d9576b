//! Policy API endpoints.

use crate::error::AppError;
use crate::policy::{DecisionEngine, SettingsPermissions};
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Policy service state shared across handlers.
#[derive(Clone)]
pub struct PolicyState {
    pub engine: Arc<DecisionEngine>,
    pub evaluation_timeout: Duration,
}

/// POST /settings/permissions — Evaluate what a user may change in their settings
pub async fn settings_permissions(
    State(state): State<PolicyState>,
    body: Bytes,
) -> Result<Json<SettingsPermissions>, AppError> {
    let deadline = Instant::now() + state.evaluation_timeout;
    let permissions = state.engine.evaluate(&body, deadline).await?;
    Ok(Json(permissions))
}

/// GET /livez
pub async fn livez() -> StatusCode {
    StatusCode::OK
}

/// GET /readyz
///
/// The bundle is loaded before the listener binds, so serving implies ready.
pub async fn readyz() -> StatusCode {
    StatusCode::OK
}
