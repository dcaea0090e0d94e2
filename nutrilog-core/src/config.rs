//! Cache Configuration Module
//!
//! Configuration for the cache store and the fetch coordinators that sit on
//! top of it. Values are loaded from environment variables with defaults
//! taken from [`crate::constants`]; unparseable values fall back to the
//! default rather than failing startup.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_MAX_RETRIES, DEFAULT_MIN_FETCH_INTERVAL_MS, DEFAULT_REFRESH_ON_FOCUS,
    DEFAULT_RETRY_ON_ERROR, DEFAULT_SWEEP_INTERVAL_SECS,
};
use crate::error::ConfigError;

// ============================================================================
// STORE CONFIGURATION
// ============================================================================

/// Configuration for the shared cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// TTL applied when a caller stores a value without one.
    pub default_ttl: Duration,

    /// How often the background sweeper removes expired entries.
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl StoreConfig {
    /// Create StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `NUTRILOG_CACHE_TTL_SECS`: Default entry TTL (default: 300)
    /// - `NUTRILOG_SWEEP_INTERVAL_SECS`: Sweep interval (default: 300)
    pub fn from_env() -> Self {
        Self {
            default_ttl: Duration::from_secs(env_u64(
                "NUTRILOG_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )),
            sweep_interval: Duration::from_secs(env_u64(
                "NUTRILOG_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
        }
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(invalid("sweep_interval", self.sweep_interval, "must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// FETCH OPTIONS
// ============================================================================

/// Per-coordinator fetch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// TTL for values this coordinator writes to the store.
    pub ttl: Duration,

    /// Re-request on focus when the store has no usable entry.
    pub refresh_on_focus: bool,

    /// Retry transient failures with exponential backoff.
    pub retry_on_error: bool,

    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Non-forced requests closer together than this are suppressed.
    pub min_fetch_interval: Duration,

    /// Delay before the first retry. Doubles with every retry.
    pub initial_backoff: Duration,

    /// Cap on a single backoff delay.
    pub max_backoff: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            refresh_on_focus: DEFAULT_REFRESH_ON_FOCUS,
            retry_on_error: DEFAULT_RETRY_ON_ERROR,
            max_retries: DEFAULT_MAX_RETRIES,
            min_fetch_interval: Duration::from_millis(DEFAULT_MIN_FETCH_INTERVAL_MS),
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl FetchOptions {
    /// Create FetchOptions from environment variables.
    ///
    /// Environment variables:
    /// - `NUTRILOG_CACHE_TTL_SECS`: TTL for fetched values (default: 300)
    /// - `NUTRILOG_REFRESH_ON_FOCUS`: "true" or "false" (default: true)
    /// - `NUTRILOG_RETRY_ON_ERROR`: "true" or "false" (default: true)
    /// - `NUTRILOG_MAX_RETRIES`: Retries after the first attempt (default: 3)
    /// - `NUTRILOG_MIN_FETCH_INTERVAL_MS`: Rate-limit window (default: 1000)
    /// - `NUTRILOG_INITIAL_BACKOFF_MS`: First retry delay (default: 1000)
    /// - `NUTRILOG_MAX_BACKOFF_MS`: Backoff cap (default: 30000)
    pub fn from_env() -> Self {
        Self {
            ttl: Duration::from_secs(env_u64("NUTRILOG_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)),
            refresh_on_focus: env_bool("NUTRILOG_REFRESH_ON_FOCUS", DEFAULT_REFRESH_ON_FOCUS),
            retry_on_error: env_bool("NUTRILOG_RETRY_ON_ERROR", DEFAULT_RETRY_ON_ERROR),
            max_retries: std::env::var("NUTRILOG_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            min_fetch_interval: Duration::from_millis(env_u64(
                "NUTRILOG_MIN_FETCH_INTERVAL_MS",
                DEFAULT_MIN_FETCH_INTERVAL_MS,
            )),
            initial_backoff: Duration::from_millis(env_u64(
                "NUTRILOG_INITIAL_BACKOFF_MS",
                DEFAULT_INITIAL_BACKOFF_MS,
            )),
            max_backoff: Duration::from_millis(env_u64(
                "NUTRILOG_MAX_BACKOFF_MS",
                DEFAULT_MAX_BACKOFF_MS,
            )),
        }
    }

    /// Set the TTL for fetched values.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable refresh on focus.
    pub fn with_refresh_on_focus(mut self, enabled: bool) -> Self {
        self.refresh_on_focus = enabled;
        self
    }

    /// Enable or disable automatic retries.
    pub fn with_retry_on_error(mut self, enabled: bool) -> Self {
        self.retry_on_error = enabled;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the rate-limit window.
    pub fn with_min_fetch_interval(mut self, interval: Duration) -> Self {
        self.min_fetch_interval = interval;
        self
    }

    /// Set the initial backoff and its cap.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_on_error && self.max_retries > 0 && self.initial_backoff.is_zero() {
            return Err(invalid(
                "initial_backoff",
                self.initial_backoff,
                "must be positive when retries are enabled",
            ));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::IncompatibleOptions {
                option_a: format!("initial_backoff={:?}", self.initial_backoff),
                option_b: format!("max_backoff={:?}", self.max_backoff),
            });
        }
        Ok(())
    }
}

// ============================================================================
// COMBINED CONFIGURATION
// ============================================================================

/// Application-level cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NutrilogConfig {
    pub store: StoreConfig,
    pub fetch: FetchOptions,
}

impl NutrilogConfig {
    pub fn from_env() -> Self {
        Self {
            store: StoreConfig::from_env(),
            fetch: FetchOptions::from_env(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.fetch.validate()
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| match s.trim().to_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => default,
        })
        .unwrap_or(default)
}

fn invalid(field: &str, value: Duration, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: format!("{:?}", value),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = NutrilogConfig::default();
        assert_eq!(config.store.default_ttl, Duration::from_secs(300));
        assert_eq!(config.store.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.fetch.ttl, Duration::from_secs(300));
        assert!(config.fetch.refresh_on_focus);
        assert!(config.fetch.retry_on_error);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.min_fetch_interval, Duration::from_secs(1));
        assert_eq!(config.fetch.initial_backoff, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fetch_options_builder() {
        let options = FetchOptions::default()
            .with_ttl(Duration::from_secs(60))
            .with_refresh_on_focus(false)
            .with_retry_on_error(false)
            .with_max_retries(5)
            .with_min_fetch_interval(Duration::from_millis(250))
            .with_backoff(Duration::from_millis(100), Duration::from_secs(2));

        assert_eq!(options.ttl, Duration::from_secs(60));
        assert!(!options.refresh_on_focus);
        assert!(!options.retry_on_error);
        assert_eq!(options.max_retries, 5);
        assert_eq!(options.min_fetch_interval, Duration::from_millis(250));
        assert_eq!(options.initial_backoff, Duration::from_millis(100));
        assert_eq!(options.max_backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let options = FetchOptions::default()
            .with_backoff(Duration::from_secs(10), Duration::from_secs(1));
        assert!(matches!(
            options.validate(),
            Err(ConfigError::IncompatibleOptions { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_backoff_with_retries() {
        let options = FetchOptions::default().with_backoff(Duration::ZERO, Duration::ZERO);
        assert!(options.validate().is_err());

        let no_retries = options.with_retry_on_error(false);
        assert!(no_retries.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sweep_interval() {
        let store = StoreConfig::default().with_sweep_interval(Duration::ZERO);
        assert!(store.validate().is_err());
    }

    #[test]
    fn test_from_env_reads_overrides() {
        let _env_lock = ENV_MUTEX.lock().expect("env mutex should not be poisoned");
        let _ttl = EnvVarGuard::set("NUTRILOG_CACHE_TTL_SECS", Some("60"));
        let _focus = EnvVarGuard::set("NUTRILOG_REFRESH_ON_FOCUS", Some("false"));
        let _retries = EnvVarGuard::set("NUTRILOG_MAX_RETRIES", Some("5"));
        let _interval = EnvVarGuard::set("NUTRILOG_MIN_FETCH_INTERVAL_MS", Some("250"));

        let config = NutrilogConfig::from_env();
        assert_eq!(config.store.default_ttl, Duration::from_secs(60));
        assert_eq!(config.fetch.ttl, Duration::from_secs(60));
        assert!(!config.fetch.refresh_on_focus);
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.min_fetch_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_from_env_falls_back_on_garbage() {
        let _env_lock = ENV_MUTEX.lock().expect("env mutex should not be poisoned");
        let _retries = EnvVarGuard::set("NUTRILOG_MAX_RETRIES", Some("lots"));
        let _retry = EnvVarGuard::set("NUTRILOG_RETRY_ON_ERROR", Some("maybe"));
        let _sweep = EnvVarGuard::set("NUTRILOG_SWEEP_INTERVAL_SECS", None);

        let config = NutrilogConfig::from_env();
        assert_eq!(config.fetch.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.fetch.retry_on_error);
        assert_eq!(
            config.store.sweep_interval,
            Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)
        );
    }
}
