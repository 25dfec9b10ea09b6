//! Environment variable loading and validation.
//!
//! This module handles loading configuration from .env files and environment variables,
//! ensuring all required values are present before the application starts.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_STORE_ENDPOINT: &str = "redis://127.0.0.1:6379";
const DEFAULT_TURN_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_RECONNECT_GRACE_SECONDS: u64 = 300;
const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 3600;
const DEFAULT_ROOM_QUEUE_CAPACITY: usize = 256;
const DEFAULT_LOG_LEVEL: &str = "hokm_server=debug,tower_http=debug,axum=info";

/// Loads environment variables from a `.env` file.
///
/// This function should be called early in main() before accessing any environment variables.
/// It will load variables from a .env file in the project root if present.
///
/// # Panics
/// Does not panic - if .env file is missing, environment variables from the system are used.
pub fn load_env() {
    dotenvy::dotenv().ok();
}

/// All server settings, loaded once at startup and handed to the pieces
/// that need them (listener, `CoordinatorManager`, `RedisSessionStore`).
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_address: SocketAddr,
    pub store_endpoint: String,
    pub turn_timeout: Duration,
    pub reconnect_grace: Duration,
    pub heartbeat_interval: Duration,
    pub session_ttl: Duration,
    pub room_queue_capacity: usize,
    pub log_level: String,
}

impl Config {
    /// Assemble configuration from the environment, applying defaults for
    /// anything unset. Called once, after [`load_env`] and before
    /// [`validate_env`].
    pub fn from_env() -> Self {
        Config {
            listen_address: get_listen_address(),
            store_endpoint: get_store_endpoint(),
            turn_timeout: Duration::from_secs(get_u64("HOKM_TURN_TIMEOUT_SECONDS", DEFAULT_TURN_TIMEOUT_SECONDS)),
            reconnect_grace: Duration::from_secs(get_u64(
                "HOKM_RECONNECT_GRACE_SECONDS",
                DEFAULT_RECONNECT_GRACE_SECONDS,
            )),
            heartbeat_interval: Duration::from_secs(get_u64(
                "HOKM_HEARTBEAT_INTERVAL_SECONDS",
                DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
            )),
            session_ttl: Duration::from_secs(get_u64("HOKM_SESSION_TTL_SECONDS", DEFAULT_SESSION_TTL_SECONDS)),
            room_queue_capacity: get_usize("HOKM_ROOM_QUEUE_CAPACITY", DEFAULT_ROOM_QUEUE_CAPACITY),
            log_level: get_log_level(),
        }
    }
}

/// The `tracing_subscriber::EnvFilter` directive string. `RUST_LOG`, when
/// set, takes precedence over `HOKM_LOG_LEVEL` — both are ways to spell the
/// same directive syntax, and `RUST_LOG` is the convention every
/// `tracing`-based tool already looks for.
fn get_log_level() -> String {
    env::var("RUST_LOG").or_else(|_| env::var("HOKM_LOG_LEVEL")).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

fn get_listen_address() -> SocketAddr {
    env::var("HOKM_LISTEN_ADDRESS")
        .unwrap_or_else(|_| DEFAULT_LISTEN_ADDRESS.to_string())
        .parse()
        .expect("HOKM_LISTEN_ADDRESS must be a valid host:port")
}

/// The SessionStore backend endpoint.
///
/// # Panics
/// Does not panic directly, but an unreachable or malformed endpoint will
/// surface as a `StoreUnavailableError` the first time the store connects.
fn get_store_endpoint() -> String {
    env::var("HOKM_STORE_ENDPOINT").unwrap_or_else(|_| DEFAULT_STORE_ENDPOINT.to_string())
}

fn get_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .map(|raw| raw.parse().unwrap_or_else(|_| panic!("{key} must be a non-negative integer")))
        .unwrap_or(default)
}

fn get_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .map(|raw| raw.parse().unwrap_or_else(|_| panic!("{key} must be a non-negative integer")))
        .unwrap_or(default)
}

/// Validates all required environment variables are present and well-formed.
///
/// This function checks that all required configuration is available before
/// starting the server, providing clear error messages if anything is missing.
///
/// # Panics
/// Panics if any required environment variable is missing or malformed.
pub fn validate_env() -> Config {
    let config = Config::from_env();
    if config.room_queue_capacity == 0 {
        panic!("HOKM_ROOM_QUEUE_CAPACITY must be greater than zero");
    }
    config
}
