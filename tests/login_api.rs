//! Integration tests for the login service.
//!
//! Sessions live in an in-memory store and time is driven by a manual clock,
//! so these tests need neither Redis nor the users API.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::{header, StatusCode};
use shipkrew_auth::{
    auth::{hash_password, LoginState},
    clock::{Clock, ManualClock},
    directory::{ApiErrorBody, DirectoryError, User, UserDirectory, CODE_USER_NOT_FOUND},
    models::{LoginResponse, SessionStatusResponse},
    routes,
    session::{SessionManager, SessionSettings},
    storage::{KvStore, MemoryStore, Namespaced},
};
use std::collections::HashMap;
use std::sync::Arc;

struct FakeDirectory {
    users: HashMap<String, User>,
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn get_user_by_username(&self, username: &str) -> Result<User, DirectoryError> {
        self.users
            .get(username)
            .cloned()
            .ok_or_else(|| {
                DirectoryError::Api(ApiErrorBody {
                    code: CODE_USER_NOT_FOUND,
                    message: "user not found".to_string(),
                })
            })
    }
}

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

impl TestServer {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        self.clock.now()
    }

    async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/login", self.base_url))
            .form(&[("login_username", username), ("login_password", password)])
            .send()
            .await
            .unwrap()
    }

    async fn login_with_cookie(&self, token: &str, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/login", self.base_url))
            .header(header::COOKIE, format!("session={}", token))
            .form(&[("login_username", username), ("login_password", password)])
            .send()
            .await
            .unwrap()
    }

    async fn with_cookie(&self, method: reqwest::Method, path: &str, token: &str) -> reqwest::Response {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(header::COOKIE, format!("session={}", token))
            .send()
            .await
            .unwrap()
    }
}

fn test_user(id: i64, username: &str, password: &str) -> User {
    let (digest, salt) = hash_password(password);
    User {
        id,
        username: username.to_string(),
        base64_password_hash: Some(digest),
        base64_salt: Some(salt),
    }
}

/// Spin up a login server and return a handle to it.
async fn spawn_test_server() -> TestServer {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ));
    let store = Arc::new(MemoryStore::new());

    let mut users = HashMap::new();
    users.insert("alice".to_string(), test_user(7, "alice", "hunter2"));
    users.insert(
        "ghost".to_string(),
        User {
            id: 9,
            username: "ghost".to_string(),
            base64_password_hash: None,
            base64_salt: None,
        },
    );

    let sessions = SessionManager::new(
        Arc::new(Namespaced::new(store.clone(), "sessions/")),
        clock.clone(),
        SessionSettings::default(),
    );
    let state = LoginState {
        sessions: Arc::new(sessions),
        directory: Arc::new(FakeDirectory { users }),
        request_timeout: std::time::Duration::from_secs(5),
        cookie_secure: false,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, routes::login_app(state))
            .await
            .unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        clock,
        store,
    }
}

fn session_token(response: &reqwest::Response) -> String {
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie missing")
        .to_str()
        .unwrap();
    cookie
        .strip_prefix("session=")
        .and_then(|rest| rest.split(';').next())
        .unwrap()
        .to_string()
}

async fn logged_in(server: &TestServer) -> String {
    let response = server.login("alice", "hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);
    session_token(&response)
}

#[tokio::test]
async fn test_login_issues_session_cookie() {
    let server = spawn_test_server().await;

    let response = server.login("alice", "hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains(&format!("Max-Age={}", 7 * 24 * 3600)));
    assert!(!cookie.contains("Secure"));

    let token = session_token(&response);
    assert_eq!(token.len(), 43);

    let body: LoginResponse = response.json().await.unwrap();
    assert_eq!(body.user_id, 7);
    assert_eq!(body.expiration, server.clock_now() + Duration::days(7));
    assert_eq!(server.store.len(), 1);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials_alike() {
    let server = spawn_test_server().await;

    let wrong_password = server.login("alice", "wrong").await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert!(wrong_password.headers().get(header::SET_COOKIE).is_none());
    let wrong_password: serde_json::Value = wrong_password.json().await.unwrap();

    let unknown_user = server.login("mallory", "hunter2").await;
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    let unknown_user: serde_json::Value = unknown_user.json().await.unwrap();

    assert_eq!(wrong_password, unknown_user);

    let no_credentials = server.login("ghost", "anything").await;
    assert_eq!(no_credentials.status(), StatusCode::UNAUTHORIZED);

    assert!(server.store.is_empty());
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let server = spawn_test_server().await;

    let response = server.login("alice", "").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server.login("", "hunter2").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_while_logged_in_conflicts() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    let response = server
        .client
        .post(format!("{}/login", server.base_url))
        .header(header::COOKIE, format!("session={}", token))
        .form(&[("login_username", "alice"), ("login_password", "hunter2")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(server.store.len(), 1);
}

#[tokio::test]
async fn test_session_status_for_live_session() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    server.clock.advance(Duration::days(1));
    let response = server
        .with_cookie(reqwest::Method::GET, "/session", &token)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let body: SessionStatusResponse = response.json().await.unwrap();
    assert_eq!(body.user_id, 7);
    assert!(!body.renewed);
    assert_eq!(body.expiration - body.created_at, Duration::days(7));
}

#[tokio::test]
async fn test_session_renewed_near_expiry() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    // Two whole days left.
    server.clock.advance(Duration::days(5));
    let now = server.clock_now();

    let response = server
        .with_cookie(reqwest::Method::GET, "/session", &token)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("renewal re-issues the cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with(&format!("session={};", token)));

    let body: SessionStatusResponse = response.json().await.unwrap();
    assert!(body.renewed);
    assert_eq!(body.expiration, now + Duration::days(7));
}

#[tokio::test]
async fn test_expired_session_is_deleted_and_cookie_cleared() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    server.clock.advance(Duration::days(7) + Duration::seconds(1));

    let response = server
        .with_cookie(reqwest::Method::GET, "/session", &token)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.contains("Max-Age=0"));
    assert!(server.store.is_empty());

    // The record is gone, so a replay is a plain miss.
    let replay = server
        .with_cookie(reqwest::Method::GET, "/session", &token)
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert!(replay.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_expired_session_allows_new_login() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    server.clock.advance(Duration::days(8));

    let response = server
        .client
        .post(format!("{}/login", server.base_url))
        .header(header::COOKIE, format!("session={}", token))
        .form(&[("login_username", "alice"), ("login_password", "hunter2")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(session_token(&response), token);
    assert_eq!(server.store.len(), 1);
}

#[tokio::test]
async fn test_logout_deletes_session() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    let response = server
        .with_cookie(reqwest::Method::POST, "/logout", &token)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.contains("Max-Age=0"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(server.store.is_empty());

    let response = server
        .with_cookie(reqwest::Method::GET, "/session", &token)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_session() {
    let server = spawn_test_server().await;

    let response = server
        .client
        .post(format!("{}/logout", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .with_cookie(reqwest::Method::POST, "/logout", "not-a-real-token")
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_store_outage_is_server_error() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    server.store.set_unavailable(true);

    let response = server
        .with_cookie(reqwest::Method::GET, "/session", &token)
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Internal server error");

    let response = server.login("alice", "hunter2").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_security_headers_on_login_routes() {
    let server = spawn_test_server().await;

    let response = server.login("alice", "wrong").await;
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

fn clears_cookie(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("session=;") && v.contains("Max-Age=0"))
}

#[tokio::test]
async fn test_corrupt_session_does_not_block_login() {
    let server = spawn_test_server().await;
    server.store.put("sessions/bad", "{garbage").await.unwrap();

    let response = server.login_with_cookie("bad", "alice", "hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(session_token(&response), "bad");

    // The unreadable record was dropped; only the new session remains.
    assert_eq!(server.store.len(), 1);
    assert_eq!(server.store.get("sessions/bad").await.unwrap(), None);
}

#[tokio::test]
async fn test_corrupt_session_is_cleared() {
    let server = spawn_test_server().await;
    server.store.put("sessions/bad", "{garbage").await.unwrap();

    let response = server
        .with_cookie(reqwest::Method::GET, "/session", "bad")
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(clears_cookie(&response));
    assert!(server.store.is_empty());

    server.store.put("sessions/bad", "{garbage").await.unwrap();
    let response = server
        .with_cookie(reqwest::Method::POST, "/logout", "bad")
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(clears_cookie(&response));
    assert!(server.store.is_empty());
}

#[tokio::test]
async fn test_logout_with_expired_session_clears_cookie() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    server.clock.advance(Duration::days(8));

    let response = server
        .with_cookie(reqwest::Method::POST, "/logout", &token)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(clears_cookie(&response));
    assert!(server.store.is_empty());
}

#[tokio::test]
async fn test_failed_login_with_expired_session_clears_cookie() {
    let server = spawn_test_server().await;
    let token = logged_in(&server).await;

    server.clock.advance(Duration::days(8));

    let response = server.login_with_cookie(&token, "alice", "wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(clears_cookie(&response));
    assert!(server.store.is_empty());

    // Without a stale cookie a failed login sets nothing.
    let response = server.login("alice", "wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}
