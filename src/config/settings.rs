use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::application::services::{ConversionWorkerConfig, RetryPolicy, SplitPolicy};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub split: SplitSettings,
    pub conversion: ConversionSettings,
    pub retry: RetrySettings,
    pub tracker: TrackerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitSettings {
    pub pages_per_part: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversionSettings {
    pub pool_size: usize,
    pub throttle_ms: u64,
    pub timeout_secs: u64,
    pub converter_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerBackend {
    /// Single-process only; state dies with the process.
    Memory,
    /// Required whenever more than one coordinator/merger instance runs.
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSettings {
    pub backend: TrackerBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub root_dir: PathBuf,
}

impl Settings {
    /// Reads settings from `PARTWISE_*` environment variables, falling back
    /// to defaults suitable for a local single-process deployment.
    pub fn from_env() -> Self {
        let backend = match std::env::var("PARTWISE_TRACKER_BACKEND")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "postgres" => TrackerBackend::Postgres,
            _ => TrackerBackend::Memory,
        };

        Self {
            split: SplitSettings {
                pages_per_part: env_or("PARTWISE_PAGES_PER_PART", 25),
            },
            conversion: ConversionSettings {
                pool_size: env_or("PARTWISE_POOL_SIZE", 3),
                throttle_ms: env_or("PARTWISE_THROTTLE_MS", 250),
                timeout_secs: env_or("PARTWISE_CONVERSION_TIMEOUT_SECS", 120),
                converter_url: std::env::var("PARTWISE_CONVERTER_URL")
                    .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            },
            retry: RetrySettings {
                max_attempts: env_or("PARTWISE_MAX_ATTEMPTS", 3),
                backoff_ms: env_or("PARTWISE_BACKOFF_MS", 500),
            },
            tracker: TrackerSettings {
                backend,
                database_url: std::env::var("DATABASE_URL").ok(),
                max_connections: env_or("PARTWISE_PG_MAX_CONNECTIONS", 5),
            },
            storage: StorageSettings {
                root_dir: std::env::var("PARTWISE_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp/partwise")),
            },
        }
    }

    pub fn split_policy(&self) -> SplitPolicy {
        SplitPolicy::new(self.split.pages_per_part)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff_base: Duration::from_millis(self.retry.backoff_ms),
        }
    }

    pub fn worker_config(&self) -> ConversionWorkerConfig {
        ConversionWorkerConfig {
            pool_size: self.conversion.pool_size,
            throttle_interval: Duration::from_millis(self.conversion.throttle_ms),
            conversion_timeout: Duration::from_secs(self.conversion.timeout_secs),
        }
    }
}
