//! API route handlers.

pub mod login;
pub mod policy;

use crate::auth::LoginState;
use crate::middleware::security_headers;
use axum::{routing::get, routing::post, Router};
use policy::PolicyState;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the login service router with all endpoints.
pub fn login_router() -> Router<LoginState> {
    Router::new()
        .route("/login", post(login::login))
        .route("/logout", post(login::logout))
        .route("/session", get(login::session_status))
}

/// Build the policy service router with all endpoints.
pub fn policy_router() -> Router<PolicyState> {
    Router::new()
        .route("/settings/permissions", post(policy::settings_permissions))
        .route("/livez", get(policy::livez))
        .route("/readyz", get(policy::readyz))
}

/// Login service with middleware applied.
pub fn login_app(state: LoginState) -> Router {
    // CorsLayer::new() with no allowed origins rejects all CORS preflight requests.
    login_router()
        .layer(CorsLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state)
}

/// Policy service with middleware applied.
pub fn policy_app(state: PolicyState) -> Router {
    policy_router()
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state)
}
