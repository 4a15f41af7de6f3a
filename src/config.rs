use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::services::FeedConfig;
use crate::sources::finnhub::FINNHUB_URL;
use crate::sources::finnhub_ws::FINNHUB_WS_URL;
use crate::sources::StreamConfig;
use crate::types::{SESSION_TTL_MS, STARTING_BALANCE};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// SQLite database file.
    pub database_path: String,
    /// Finnhub token. Without it quotes are unavailable and the stream only simulates.
    pub finnhub_api_key: Option<String>,
    pub finnhub_rest_url: String,
    pub finnhub_ws_url: String,
    /// Wallet grant for new accounts.
    pub starting_balance: f64,
    /// Stale-symbol polling period (ms).
    pub poll_interval_ms: u64,
    /// A symbol without a stream tick for this long is polled (ms).
    pub stale_threshold_ms: u64,
    /// Simulated tick period while the stream is down (ms).
    pub simulation_interval_ms: u64,
    /// Reconnect backoff cap (ms).
    pub reconnect_max_ms: u64,
    pub session_ttl_hours: u64,
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    parse_env_where(key, default, |_| true)
}

/// Parse `key` if set. A value that fails to parse or to validate is logged
/// and replaced by `default`.
fn parse_env_where<T: FromStr>(key: &str, default: T, valid: impl Fn(&T) -> bool) -> T {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!("Ignoring invalid {}={:?}, using the default", key, raw);
            default
        }
    }
}

fn valid_balance(balance: &f64) -> bool {
    balance.is_finite() && *balance >= 0.0
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let finnhub_api_key = env::var("FINNHUB_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("PORT", 3001),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "point_market.db".to_string()),
            finnhub_api_key,
            finnhub_rest_url: env::var("FINNHUB_REST_URL").unwrap_or_else(|_| FINNHUB_URL.to_string()),
            finnhub_ws_url: env::var("FINNHUB_WS_URL").unwrap_or_else(|_| FINNHUB_WS_URL.to_string()),
            starting_balance: parse_env_where("STARTING_BALANCE", STARTING_BALANCE, valid_balance),
            poll_interval_ms: parse_env("POLL_INTERVAL_MS", 5_000),
            stale_threshold_ms: parse_env("STALE_THRESHOLD_MS", 10_000),
            simulation_interval_ms: parse_env("SIMULATION_INTERVAL_MS", 1_500),
            reconnect_max_ms: parse_env("RECONNECT_MAX_MS", 10_000),
            session_ttl_hours: parse_env("SESSION_TTL_HOURS", (SESSION_TTL_MS / 3_600_000) as u64),
        }
    }

    /// Stream client timing.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.finnhub_ws_url.clone(),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
            simulation_interval: Duration::from_millis(self.simulation_interval_ms.max(1)),
            ..StreamConfig::default()
        }
    }

    /// Price feed polling.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            stale_threshold: Duration::from_millis(self.stale_threshold_ms),
        }
    }

    pub fn session_ttl_ms(&self) -> i64 {
        self.session_ttl_hours as i64 * 3_600_000
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            database_path: ":memory:".to_string(),
            finnhub_api_key: None,
            finnhub_rest_url: FINNHUB_URL.to_string(),
            finnhub_ws_url: FINNHUB_WS_URL.to_string(),
            starting_balance: STARTING_BALANCE,
            poll_interval_ms: 5_000,
            stale_threshold_ms: 10_000,
            simulation_interval_ms: 1_500,
            reconnect_max_ms: 10_000,
            session_ttl_hours: 24,
        }
    }
}
