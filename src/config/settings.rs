//! Configuration settings.
//!
//! Defines the main `Config` struct and environment variable loading logic.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("pretty") {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

fn get_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} must be set in environment"))
}

fn get_env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn get_env_u64_or(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn get_env_usize_or(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the gateway listens on.
    pub listen_addr: SocketAddr,
    /// Internal rendering engine URL (e.g. `http://qgis-server/ows/`).
    pub engine_url: String,
    /// Root prepended to `<user>/<project>/<file>` in the `MAP` parameter.
    pub publish_root: String,
    /// Filesystem root holding project metadata.
    pub projects_root: PathBuf,
    /// Trusted header carrying the authenticated username.
    pub identity_header: String,
    /// Timeout for buffered exchanges with the engine.
    pub engine_timeout: Duration,
    /// Maximum buffered WFS transaction body size in bytes.
    pub max_transaction_body_size: usize,
    /// Realm used in the Basic challenge of OWS 401 responses.
    pub auth_realm: String,
    /// Logging format.
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Panics
    ///
    /// Panics if `ENGINE_URL` is missing or `LISTEN_ADDR` is not a valid socket address.
    #[must_use]
    pub fn from_env() -> Arc<Self> {
        let listen_addr = get_env_or("LISTEN_ADDR", "0.0.0.0:8080")
            .parse()
            .expect("LISTEN_ADDR must be a valid socket address");
        let engine_url = get_env("ENGINE_URL");
        let publish_root = get_env_or("PUBLISH_ROOT", "/publish");
        let projects_root = PathBuf::from(get_env_or("PROJECTS_ROOT", "/publish"));
        let identity_header = get_env_or("IDENTITY_HEADER", "X-Forwarded-User");
        let engine_timeout = Duration::from_secs(get_env_u64_or("ENGINE_TIMEOUT_SECS", 60));
        let max_transaction_body_size =
            get_env_usize_or("MAX_TRANSACTION_BODY_SIZE", 10 * 1024 * 1024);

        Arc::new(Self {
            listen_addr,
            engine_url,
            publish_root,
            projects_root,
            identity_header,
            engine_timeout,
            max_transaction_body_size,
            auth_realm: get_env_or("AUTH_REALM", "Restricted"),
            log_format: LogFormat::from_str(&get_env_or("LOG_FORMAT", "json")),
        })
    }
}
