//! Environment-driven configuration
//!
//! Required: `MARKET_ETL_DB`, `MARKET_ETL_API_KEY`, `MARKET_ETL_TOKEN_PATH`.
//! Everything else has a default tuned for the upstream 120-requests-per-minute cap.

use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.tdameritrade.com/v1";

/// Runtime configuration for the worker and enqueue commands.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Upstream API key, attached as a query parameter to every request.
    pub api_key: String,
    /// Path to the bearer credential file read by the token provider.
    pub token_path: PathBuf,
    /// Upstream base URL, overridable for tests.
    pub base_url: String,
    /// Fixed delay between successive upstream calls.
    pub throttle: Duration,
    /// Maximum attempts per call; only transport failures are retried.
    pub retry_max: u32,
    /// Wait between retry attempts.
    pub retry_wait: Duration,
    /// Concurrency cap for the transform/load tasks.
    pub transform_concurrency: usize,
    /// Worker lease time-to-live; an expired lease can be taken over.
    pub lease_ttl: Duration,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_path: PathBuf::from(required("MARKET_ETL_DB")?),
            api_key: required("MARKET_ETL_API_KEY")?,
            token_path: PathBuf::from(required("MARKET_ETL_TOKEN_PATH")?),
            base_url: optional("MARKET_ETL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            throttle: Duration::from_millis(parsed("MARKET_ETL_THROTTLE_MS", 1000)?),
            retry_max: parsed("MARKET_ETL_RETRY_MAX", 4)? as u32,
            retry_wait: Duration::from_millis(parsed("MARKET_ETL_RETRY_WAIT_MS", 2000)?),
            transform_concurrency: parsed("MARKET_ETL_TRANSFORM_CONCURRENCY", 8)? as usize,
            lease_ttl: Duration::from_secs(parsed("MARKET_ETL_LEASE_TTL_SECS", 3600)?),
        })
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| AppError::Config(format!("missing required environment variable {}", name)))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parsed(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be an integer, got {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}
