//! Central Configuration Constants
//!
//! Single source of truth for all session defaults.
//! Every value can be overridden through the environment via the getters below.

/// Default assessment backend URL
///
/// For development: http://localhost:8080
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Quiet period before a debounced draft save (ms)
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;

/// Automatic retries after the first failed save
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Linear backoff unit between retries (ms), multiplied by the retry count
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2000;

/// How long the `saved` status stays visible (ms)
pub const SAVED_DISPLAY_MS: u64 = 2000;

/// How long the `error` status stays visible (ms)
pub const ERROR_DISPLAY_MS: u64 = 5000;

/// Periodic sync queue flush interval (seconds)
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

/// Local cache entries older than this are garbage (hours)
pub const CACHE_TTL_HOURS: i64 = 24;

/// A synced cache entry younger than this still wins over server content (seconds)
pub const CACHE_RECENT_SECS: i64 = 5;

/// Local cache key prefix
pub const CACHE_KEY_PREFIX: &str = "assessment_draft_";

/// Minimum dev-tools poll interval (seconds)
pub const DEVTOOLS_POLL_SECS: u64 = 5;

/// Outer/inner viewport delta that counts as docked dev tools (px)
pub const DEVTOOLS_THRESHOLD_PX: u32 = 160;

/// HTTP request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Session countdown tick (ms)
pub const TIMER_TICK_MS: u64 = 1000;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Helper functions to read from env with fallback
// ============================================

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Get backend URL from environment or use default
pub fn get_api_url() -> String {
    std::env::var("SESSION_API_URL")
        .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

/// Get debounce window from environment or use default
pub fn get_debounce_ms() -> u64 {
    env_parse("DRAFT_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)
}

/// Get max retries from environment or use default
pub fn get_max_retries() -> u32 {
    env_parse("DRAFT_MAX_RETRIES", DEFAULT_MAX_RETRIES)
}

/// Get retry backoff unit from environment or use default
pub fn get_retry_backoff_ms() -> u64 {
    env_parse("DRAFT_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)
}

/// Get queue flush interval from environment or use default
pub fn get_flush_interval_secs() -> u64 {
    env_parse("SYNC_FLUSH_INTERVAL_SECS", DEFAULT_FLUSH_INTERVAL_SECS)
}

/// Get request timeout from environment or use default
pub fn get_request_timeout_secs() -> u64 {
    env_parse("SESSION_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)
}

/// Get allow-listed region ids (comma separated) from environment
pub fn get_allow_regions() -> Vec<String> {
    std::env::var("SESSION_ALLOW_REGIONS")
        .map(|s| {
            s.split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
