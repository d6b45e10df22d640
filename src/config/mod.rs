//! Configuration for the backend server and the offline-first client.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Backend configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared admin password for moderation routes (admin routes are closed when unset)
    pub admin_password: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let admin_password = env::var("TEAMFINDER_ADMIN_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty());

        let db_path = env::var("TEAMFINDER_DB_PATH")
            .unwrap_or_else(|_| "./data/teamfinder.sqlite".to_string())
            .into();

        let bind_addr = parse_var("TEAMFINDER_BIND_ADDR", || {
            SocketAddr::from(([127, 0, 0, 1], 8080))
        });

        let log_level = env::var("TEAMFINDER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = env::var("TEAMFINDER_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let cors_origins = env::var("TEAMFINDER_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            admin_password,
            db_path,
            bind_addr,
            log_level,
            log_json,
            cors_origins,
        }
    }
}

/// Offline-first client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend, without the `/api` suffix
    pub api_base_url: String,
    /// Path to the on-device cache database
    pub cache_path: PathBuf,
    /// Upper bound on a single remote call before it counts as unavailable
    pub remote_timeout: Duration,
    /// Failed replays after which a queued mutation is dropped; `None` retries forever
    pub max_replay_attempts: Option<u32>,
    /// Interval between backend health probes
    pub probe_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".to_string(),
            cache_path: PathBuf::from("./data/client-cache.sqlite"),
            remote_timeout: Duration::from_secs(10),
            max_replay_attempts: None,
            probe_interval: Duration::from_secs(15),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let api_base_url = env::var("TEAMFINDER_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);

        let cache_path = env::var("TEAMFINDER_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_path);

        let remote_timeout = Duration::from_secs(parse_var(
            "TEAMFINDER_REMOTE_TIMEOUT_SECS",
            || defaults.remote_timeout.as_secs(),
        ));

        let max_replay_attempts = env::var("TEAMFINDER_MAX_REPLAY_ATTEMPTS")
            .ok()
            .and_then(|raw| match raw.parse::<u32>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("Ignoring invalid TEAMFINDER_MAX_REPLAY_ATTEMPTS: {}", raw);
                    None
                }
            });

        let probe_interval = Duration::from_secs(parse_var(
            "TEAMFINDER_PROBE_INTERVAL_SECS",
            || defaults.probe_interval.as_secs(),
        ));

        Self {
            api_base_url,
            cache_path,
            remote_timeout,
            max_replay_attempts,
            probe_interval,
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn parse_var<T: FromStr>(name: &str, default: impl FnOnce() -> T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}: {}", name, raw);
            default()
        }),
        Err(_) => default(),
    }
}
