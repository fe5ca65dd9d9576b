//! Service entry point.
//!
//! One binary, two services:
//! - `login`: session lifecycle endpoints backed by Redis
//! - `policy`: settings-permission decisions backed by a Rego bundle
//!
//! Also supports `hash-password` for producing a stored digest and salt.

use shipkrew_auth::{
    auth::{hash_password, LoginState},
    clock::SystemClock,
    config::Config,
    directory::HttpUserDirectory,
    policy::{load_bundle, DecisionEngine, SETTINGS_PERMISSIONS_QUERY},
    routes::{self, policy::PolicyState},
    session::SessionManager,
    storage::{Namespaced, RedisStore},
};
use std::net::SocketAddr;
use std::sync::Arc;

fn print_usage() {
    eprintln!("Usage: shipkrew-auth <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login                    Run the login service");
    eprintln!("  policy                   Run the policy decision service");
    eprintln!("  hash-password <password> Print a base64 digest and salt for the users API");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    if command == Some("hash-password") {
        if args.len() != 3 {
            print_usage();
            std::process::exit(1);
        }
        let (digest, salt) = hash_password(&args[2]);
        println!("base64_password_hash={}", digest);
        println!("base64_salt={}", salt);
        return;
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match command {
        Some("login") => run_login().await,
        Some("policy") => run_policy().await,
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }
}

async fn run_login() {
    let config = Config::from_env().expect("Failed to load config");
    let redis_url = config.require_redis_url().expect("Login service needs Redis");

    let store = RedisStore::open(redis_url).expect("Invalid Redis URL");
    store.ping().await.expect("Failed to connect to Redis");
    let store = Namespaced::new(store, config.session_key_prefix.clone());
    tracing::info!(prefix = store.prefix(), "Session store connected");

    let sessions = SessionManager::new(
        Arc::new(store),
        Arc::new(SystemClock),
        config.session_settings(),
    );
    let directory = HttpUserDirectory::new(config.users_api_url.clone(), config.request_timeout())
        .expect("Failed to build users API client");

    let state = LoginState {
        sessions: Arc::new(sessions),
        directory: Arc::new(directory),
        request_timeout: config.request_timeout(),
        cookie_secure: config.cookie_secure,
    };

    serve(config.login_bind_addr, routes::login_app(state)).await;
}

async fn run_policy() {
    let config = Config::from_env().expect("Failed to load config");

    let evaluator = match load_bundle(&config.policy_dir, SETTINGS_PERMISSIONS_QUERY) {
        Ok(evaluator) => evaluator,
        Err(e) => {
            tracing::error!(action = "bundle_load_failed", dir = %config.policy_dir.display(), error = %e, "Failed to load policy bundle");
            std::process::exit(1);
        }
    };

    let state = PolicyState {
        engine: Arc::new(DecisionEngine::new(Arc::new(evaluator))),
        evaluation_timeout: config.evaluation_timeout(),
    };

    serve(config.policy_bind_addr, routes::policy_app(state)).await;
}

async fn serve(addr: SocketAddr, app: axum::Router) {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler, keep serving until killed.
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
