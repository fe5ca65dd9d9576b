use crate::session::{SessionSettings, RENEWAL_THRESHOLD_DAYS};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    // Session store
    pub redis_url: Option<String>,
    pub session_key_prefix: String,

    // Servers
    pub login_bind_addr: SocketAddr,
    pub policy_bind_addr: SocketAddr,

    // Collaborators
    pub users_api_url: String,
    pub policy_dir: PathBuf,

    // Sessions
    pub session_ttl_secs: i64,
    pub renewal_threshold_days: i64,
    pub renewal_window_secs: i64,
    pub cookie_secure: bool,

    // Deadlines
    pub request_timeout_secs: u64,
    pub evaluation_timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("session_key_prefix", &self.session_key_prefix)
            .field("login_bind_addr", &self.login_bind_addr)
            .field("policy_bind_addr", &self.policy_bind_addr)
            .field("users_api_url", &self.users_api_url)
            .field("policy_dir", &self.policy_dir)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("renewal_threshold_days", &self.renewal_threshold_days)
            .field("renewal_window_secs", &self.renewal_window_secs)
            .field("cookie_secure", &self.cookie_secure)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("evaluation_timeout_secs", &self.evaluation_timeout_secs)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

const SEVEN_DAYS_SECS: i64 = 7 * 24 * 60 * 60;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.is_empty());

        let session_key_prefix =
            env::var("SESSION_KEY_PREFIX").unwrap_or_else(|_| "sessions/".to_string());
        if session_key_prefix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SESSION_KEY_PREFIX".to_string(),
                "cannot be empty".to_string(),
            ));
        }

        let login_bind_addr = parse_env_or_default("LOGIN_BIND_ADDR", default_bind_addr())?;
        let policy_bind_addr = parse_env_or_default("POLICY_BIND_ADDR", default_bind_addr())?;

        let users_api_url =
            env::var("USERS_API_URL").unwrap_or_else(|_| "http://users-api".to_string());
        if !users_api_url.starts_with("http://") && !users_api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "USERS_API_URL".to_string(),
                "must be an http(s) URL".to_string(),
            ));
        }

        let policy_dir = PathBuf::from(env::var("POLICY_DIR").unwrap_or_else(|_| "/rego".to_string()));

        let session_ttl_secs = parse_env_or_default("SESSION_TTL_SECS", SEVEN_DAYS_SECS)?;
        let renewal_threshold_days =
            parse_env_or_default("RENEWAL_THRESHOLD_DAYS", RENEWAL_THRESHOLD_DAYS)?;
        let renewal_window_secs = parse_env_or_default("RENEWAL_WINDOW_SECS", SEVEN_DAYS_SECS)?;
        for (key, value) in [
            ("SESSION_TTL_SECS", session_ttl_secs),
            ("RENEWAL_WINDOW_SECS", renewal_window_secs),
        ] {
            if value <= 0 {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "must be positive".to_string(),
                ));
            }
        }
        if renewal_threshold_days < 0 {
            return Err(ConfigError::InvalidValue(
                "RENEWAL_THRESHOLD_DAYS".to_string(),
                "cannot be negative".to_string(),
            ));
        }

        let cookie_secure = parse_env_or_default("COOKIE_SECURE", true)?;

        let request_timeout_secs = parse_env_or_default("REQUEST_TIMEOUT_SECS", 60)?;
        let evaluation_timeout_secs = parse_env_or_default("EVALUATION_TIMEOUT_SECS", 10)?;

        Ok(Config {
            redis_url,
            session_key_prefix,
            login_bind_addr,
            policy_bind_addr,
            users_api_url,
            policy_dir,
            session_ttl_secs,
            renewal_threshold_days,
            renewal_window_secs,
            cookie_secure,
            request_timeout_secs,
            evaluation_timeout_secs,
        })
    }

    /// Redis URL, required by the login service.
    pub fn require_redis_url(&self) -> Result<&str, ConfigError> {
        self.redis_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("REDIS_URL".to_string()))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            ttl: chrono::Duration::seconds(self.session_ttl_secs),
            renewal_threshold_days: self.renewal_threshold_days,
            renewal_window: chrono::Duration::seconds(self.renewal_window_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
