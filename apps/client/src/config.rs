//! Client configuration loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Local database file.
    pub db_path: PathBuf,
    /// Replication backend; sync is disabled without it.
    pub sync_url: Option<String>,
    /// Full-text service; lookups fail with `ServiceUnavailable` without it.
    pub fulltext_url: Option<String>,
    pub device_name: Option<String>,
    /// Account joined on first registration; a new one is created without it.
    pub account_id: Option<String>,
    pub sync_interval: Duration,
    pub tick: Duration,
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vocab-trainer")
        .join("vocab.db")
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var(name: &str, default: u64) -> Result<u64> {
    match optional_var(name) {
        Some(value) => value.parse().map_err(|_| {
            StoreError::InvalidConfiguration(format!("{} must be a positive integer", name))
        }),
        None => Ok(default),
    }
}

impl ClientConfig {
    /// Load configuration from `.env` and environment variables.
    ///
    /// | Env Var                    | Default                                   |
    /// |----------------------------|-------------------------------------------|
    /// | `VOCAB_DB_PATH`            | `<data dir>/vocab-trainer/vocab.db`       |
    /// | `VOCAB_SYNC_URL`           | unset                                     |
    /// | `VOCAB_FULLTEXT_URL`       | `VOCAB_SYNC_URL`                          |
    /// | `VOCAB_DEVICE_NAME`        | unset                                     |
    /// | `VOCAB_ACCOUNT_ID`         | unset                                     |
    /// | `VOCAB_SYNC_INTERVAL_SECS` | `30`                                      |
    /// | `VOCAB_TICK_MILLIS`        | `500`                                     |
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let sync_url = optional_var("VOCAB_SYNC_URL");
        let sync_interval = parse_var("VOCAB_SYNC_INTERVAL_SECS", 30)?;
        let tick = parse_var("VOCAB_TICK_MILLIS", 500)?;
        if sync_interval == 0 || tick == 0 {
            return Err(StoreError::InvalidConfiguration(
                "sync interval and tick must be positive".into(),
            ));
        }

        Ok(Self {
            db_path: optional_var("VOCAB_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            fulltext_url: optional_var("VOCAB_FULLTEXT_URL").or_else(|| sync_url.clone()),
            sync_url,
            device_name: optional_var("VOCAB_DEVICE_NAME"),
            account_id: optional_var("VOCAB_ACCOUNT_ID"),
            sync_interval: Duration::from_secs(sync_interval),
            tick: Duration::from_millis(tick),
        })
    }

    /// In-memory database, no remote services.
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::from(":memory:"),
            sync_url: None,
            fulltext_url: None,
            device_name: None,
            account_id: None,
            sync_interval: Duration::from_secs(30),
            tick: Duration::from_millis(500),
        }
    }
}
