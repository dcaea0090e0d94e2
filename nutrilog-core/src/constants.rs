//! Constants for nutrilog
//!
//! Default values for the cache store, fetch coordinator and sweeper.
//! Every `Default` impl and `from_env` fallback reads from here.

// ============================================================================
// CACHE STORE
// ============================================================================

/// Default time-to-live for cache entries in seconds (5 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default interval between expiry sweeps in seconds (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

// ============================================================================
// FETCH COORDINATOR
// ============================================================================

/// Default number of automatic retries after the initial attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Minimum time between two non-forced fetches of the same key (1 second)
pub const DEFAULT_MIN_FETCH_INTERVAL_MS: u64 = 1000;

/// Delay before the first retry; doubles on each further retry (1 second)
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound for a single backoff delay (30 seconds)
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Whether a consumer regaining focus refreshes missing data
pub const DEFAULT_REFRESH_ON_FOCUS: bool = true;

/// Whether transient failures are retried automatically
pub const DEFAULT_RETRY_ON_ERROR: bool = true;

// ============================================================================
// CACHE KEYS
// ============================================================================

/// Namespace for every meal-related cache entry
pub const MEALS_KEY_PREFIX: &str = "meals:";
