//! Login API endpoints.

use crate::auth::verify::verify_password;
use crate::auth::{LiveSession, LoginState, ResolvedSession};
use crate::directory::DirectoryError;
use crate::error::AppError;
use crate::models::{LoginForm, LoginResponse, SessionStatusResponse};
use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{IntoResponse, Response},
    Form, Json,
};
use zeroize::Zeroizing;

/// POST /login — Verify credentials and start a session
pub async fn login(
    State(state): State<LoginState>,
    current: ResolvedSession,
    Form(form): Form<LoginForm>,
) -> Response {
    if current.session.is_some() {
        return AppError::AlreadyLoggedIn.into_response();
    }

    match authenticate(&state, form).await {
        Ok(response) => response,
        // The cookie named a session that was just discarded.
        Err(e) if current.cleared => {
            ([(SET_COOKIE, state.clear_session_cookie())], e).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn authenticate(state: &LoginState, form: LoginForm) -> Result<Response, AppError> {
    let LoginForm {
        login_username: username,
        login_password,
    } = form;
    let password = Zeroizing::new(login_password);

    if username.is_empty() || password.is_empty() {
        return Err(AppError::InvalidInput(
            "Username and password are required".to_string(),
        ));
    }

    let deadline = state.deadline();
    let lookup = tokio::time::timeout_at(deadline, state.directory.get_user_by_username(&username));
    let user = match lookup.await {
        Ok(Ok(user)) => user,
        // Same answer as a wrong password: do not disclose which usernames exist.
        Ok(Err(DirectoryError::Api(body))) if body.is_not_found() => {
            tracing::warn!(action = "auth_failed", username = %username, "Unknown user");
            return Err(AppError::InvalidCredentials);
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(AppError::Internal(
                "Users API deadline exceeded".to_string(),
            ))
        }
    };

    let (Some(digest), Some(salt)) = (&user.base64_password_hash, &user.base64_salt) else {
        tracing::warn!(action = "auth_failed", user_id = user.id, "User has no stored credentials");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(&password, digest, salt) {
        tracing::warn!(action = "auth_failed", user_id = user.id, "Invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let ttl = state.sessions.settings().ttl;
    let session = state
        .sessions
        .create_session(user.id, ttl, deadline)
        .await?;

    tracing::info!(action = "auth_success", user_id = user.id, "User authenticated");

    let cookie = state.session_cookie(&session.id, ttl)?;
    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            user_id: session.user_id,
            expiration: session.expiration,
        }),
    )
        .into_response())
}

/// GET /session — Describe the current session, renewing it near expiry
pub async fn session_status(
    State(state): State<LoginState>,
    current: ResolvedSession,
) -> Result<Response, AppError> {
    let Some(session) = current.session else {
        if current.cleared {
            return Ok((
                [(SET_COOKIE, state.clear_session_cookie())],
                AppError::Unauthenticated,
            )
                .into_response());
        }
        return Err(AppError::Unauthenticated);
    };

    let body = Json(SessionStatusResponse {
        user_id: session.user_id,
        created_at: session.created_at,
        expiration: session.expiration,
        renewed: current.renewed,
    });

    if current.renewed {
        let remaining = session.expiration - state.sessions.now();
        let cookie = state.session_cookie(&session.id, remaining)?;
        return Ok(([(SET_COOKIE, cookie)], body).into_response());
    }

    Ok(body.into_response())
}

/// POST /logout — Invalidate the current session
pub async fn logout(
    State(state): State<LoginState>,
    live: LiveSession,
) -> Result<Response, AppError> {
    state
        .sessions
        .delete_session(&live.session.id, state.deadline())
        .await?;

    tracing::info!(action = "logout", user_id = live.session.user_id, "User logged out");

    Ok((
        [(SET_COOKIE, state.clear_session_cookie())],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response())
}
