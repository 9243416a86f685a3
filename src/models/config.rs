//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and scraping behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Thread tracking defaults
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::config("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::config("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.page_delay_ms == 0 {
            return Err(AppError::config(
                "crawler.page_delay_ms must be > 0 (origin rate-limit policy)",
            ));
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(AppError::config("monitor.poll_interval_secs must be > 0"));
        }
        if self.monitor.max_failures == 0 {
            return Err(AppError::config("monitor.max_failures must be > 0"));
        }
        if self.storage.db_path.trim().is_empty() {
            return Err(AppError::config("storage.db_path is empty"));
        }
        Ok(())
    }
}

/// HTTP client and page-walk behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between page fetches in milliseconds.
    /// Politeness policy toward the origin, not a correctness mechanism.
    #[serde(default = "defaults::page_delay")]
    pub page_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            page_delay_ms: defaults::page_delay(),
        }
    }
}

/// Default cadence and failure budget for tracking rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between polls of a tracked thread
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Failed polls a rule tolerates before the monitor shuts down
    #[serde(default = "defaults::max_failures")]
    pub max_failures: u32,

    /// Grace period after shutdown broadcast, for in-flight callbacks
    #[serde(default = "defaults::grace_period")]
    pub grace_period_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::poll_interval(),
            max_failures: defaults::max_failures(),
            grace_period_ms: defaults::grace_period(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite database file
    #[serde(default = "defaults::db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: defaults::db_path(),
        }
    }
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn page_delay() -> u64 {
        1000
    }
    pub fn poll_interval() -> u64 {
        30
    }
    pub fn max_failures() -> u32 {
        20
    }
    pub fn grace_period() -> u64 {
        1000
    }
    pub fn db_path() -> String {
        "data/building.db".into()
    }
}
