//! Session configuration
//!
//! Per-component settings. `Default` reads the environment through `constants`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;

/// Single-field debounce/retry pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSyncConfig {
    /// Quiet period after the last edit before saving
    pub debounce: Duration,
    /// Retries after the first failure before giving up
    pub max_retries: u32,
    /// Backoff unit, multiplied by the retry count
    pub retry_backoff: Duration,
    /// `saved` reverts to `idle` after this
    pub saved_display: Duration,
    /// `error` reverts to `idle` after this
    pub error_display: Duration,
}

impl Default for DraftSyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(constants::get_debounce_ms()),
            max_retries: constants::get_max_retries(),
            retry_backoff: Duration::from_millis(constants::get_retry_backoff_ms()),
            saved_display: Duration::from_millis(constants::SAVED_DISPLAY_MS),
            error_display: Duration::from_millis(constants::ERROR_DISPLAY_MS),
        }
    }
}

impl DraftSyncConfig {
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        self.retry_backoff * retry_count
    }
}

/// Multi-field sync queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueConfig {
    pub flush_interval: Duration,
    pub max_retries: u32,
}

impl Default for SyncQueueConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(constants::get_flush_interval_secs()),
            max_retries: constants::get_max_retries(),
        }
    }
}

/// Local persistence cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub key_prefix: String,
    pub ttl_hours: i64,
    pub recent_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: constants::CACHE_KEY_PREFIX.to_string(),
            ttl_hours: constants::CACHE_TTL_HOURS,
            recent_secs: constants::CACHE_RECENT_SECS,
        }
    }
}

/// Browser signal detectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Region ids where copy/cut and the context menu stay allowed
    pub allow_regions: Vec<String>,
    /// Dev-tools poll interval, clamped to the 5s minimum
    pub devtools_poll: Duration,
    pub devtools_threshold_px: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            allow_regions: constants::get_allow_regions(),
            devtools_poll: Duration::from_secs(constants::DEVTOOLS_POLL_SECS),
            devtools_threshold_px: constants::DEVTOOLS_THRESHOLD_PX,
        }
    }
}

impl DetectorConfig {
    pub fn effective_poll(&self) -> Duration {
        self.devtools_poll
            .max(Duration::from_secs(constants::DEVTOOLS_POLL_SECS))
    }
}

/// Everything a session needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub api_url: String,
    pub request_timeout: Duration,
    pub drafts: DraftSyncConfig,
    pub queue: SyncQueueConfig,
    pub cache: CacheConfig,
    pub detectors: DetectorConfig,
}

impl SessionConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            api_url: constants::get_api_url(),
            request_timeout: Duration::from_secs(constants::get_request_timeout_secs()),
            drafts: DraftSyncConfig::default(),
            queue: SyncQueueConfig::default(),
            cache: CacheConfig::default(),
            detectors: DetectorConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
