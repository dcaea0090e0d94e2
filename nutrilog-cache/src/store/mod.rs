//! Process-wide TTL cache store.
//!
//! One [`CacheStore`] is built at application start and shared by `Arc`
//! handle with every coordinator. It maps string keys to type-erased,
//! timestamped values and is the single source of truth for "is there
//! fresh data for this key".
//!
//! Expired entries are logically absent as soon as `now > expires_at`. They
//! are physically removed lazily when a read finds them, or by [`CacheStore::sweep`]
//! (driven periodically by the [`sweep`] task). Nothing else removes an entry
//! except explicit invalidation.
//!
//! ```ignore
//! let store = Arc::new(CacheStore::new(StoreConfig::default()));
//! store.put("meals:list", meals, Duration::from_secs(300));
//!
//! let cached: Option<Vec<Meal>> = store.get("meals:list");
//! store.invalidate(InvalidateScope::prefix("meals:"));
//! ```

pub mod entry;
pub mod stats;
pub mod sweep;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use nutrilog_core::{Clock, StoreConfig, SystemClock, Timestamp};

pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use sweep::{
    spawn_sweeper, sweep_task, SweeperHandle, SweeperMetrics, SweeperSnapshot, MIN_SWEEP_INTERVAL,
};

use stats::StoreCounters;

type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Which entries an invalidation removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidateScope {
    /// Exactly this key.
    Key(String),
    /// Every key starting with the prefix.
    Prefix(String),
    /// Every key containing the substring.
    Containing(String),
    /// Everything.
    All,
}

impl InvalidateScope {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn containing(pattern: impl Into<String>) -> Self {
        Self::Containing(pattern.into())
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Key(k) => key == k,
            Self::Prefix(p) => key.starts_with(p.as_str()),
            Self::Containing(s) => key.contains(s.as_str()),
            Self::All => true,
        }
    }
}

/// Shared key/value cache with per-entry TTL.
///
/// All operations are synchronous and safe to call concurrently from any
/// number of coordinators; writes to the same key are last-writer-wins.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry<ErasedValue>>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    counters: StoreCounters,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl CacheStore {
    /// Create an empty store on wall-clock time.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            config,
            counters: StoreCounters::default(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Current time as seen by this store.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry.
    pub fn put<T>(&self, key: impl Into<String>, value: T, ttl: Duration)
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        let entry = CacheEntry::new(Arc::new(value) as ErasedValue, self.now(), ttl);
        tracing::trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cache put");
        self.entries.insert(key, entry);
        StoreCounters::incr(&self.counters.puts);
    }

    /// Store `value` with the configured default TTL.
    pub fn put_default<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.put(key, value, self.config.default_ttl);
    }

    /// The live value under `key`, if one exists and holds a `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Any + Clone + Send + Sync,
    {
        self.entry::<T>(key).map(CacheEntry::into_value)
    }

    /// The live entry under `key` with its timestamps, if it holds a `T`.
    ///
    /// A value of another type is reported as a miss but left in place.
    pub fn entry<T>(&self, key: &str) -> Option<CacheEntry<T>>
    where
        T: Any + Clone + Send + Sync,
    {
        let typed = self.live(key).and_then(|entry| {
            let value = entry.value().downcast_ref::<T>().cloned()?;
            Some(entry.map(|_| value))
        });

        match typed {
            Some(entry) => {
                tracing::trace!(key = %key, "Cache hit");
                StoreCounters::incr(&self.counters.hits);
                Some(entry)
            }
            None => {
                StoreCounters::incr(&self.counters.misses);
                None
            }
        }
    }

    /// Whether a usable (unexpired) entry of any type exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Remove the entries selected by `scope`, returning how many were removed.
    ///
    /// In-flight fetches for the removed keys are not affected.
    pub fn invalidate(&self, scope: InvalidateScope) -> usize {
        let removed = match &scope {
            InvalidateScope::Key(key) => usize::from(self.entries.remove(key).is_some()),
            InvalidateScope::All => {
                let count = self.entries.len();
                self.entries.clear();
                count
            }
            _ => {
                let mut removed = 0;
                self.entries.retain(|key, _| {
                    let keep = !scope.matches(key);
                    if !keep {
                        removed += 1;
                    }
                    keep
                });
                removed
            }
        };

        StoreCounters::add(&self.counters.invalidations, removed);
        tracing::debug!(scope = ?scope, removed, "Cache invalidated");
        removed
    }

    pub fn invalidate_key(&self, key: &str) -> bool {
        self.invalidate(InvalidateScope::key(key)) > 0
    }

    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate(InvalidateScope::prefix(prefix))
    }

    pub fn clear(&self) -> usize {
        self.invalidate(InvalidateScope::All)
    }

    /// Physically remove every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.is_live_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        StoreCounters::add(&self.counters.evictions, removed);
        removed
    }

    /// Number of entries physically present, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys physically present, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }

    /// Live erased entry for `key`; an expired one is evicted on the way out.
    fn live(&self, key: &str) -> Option<CacheEntry<ErasedValue>> {
        let now = self.now();
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_live_at(now) {
            return Some(entry);
        }

        // Only evict if no fresher entry was written after our read.
        if self
            .entries
            .remove_if(key, |_, e| e.is_expired_at(now))
            .is_some()
        {
            tracing::trace!(key = %key, "Evicted expired entry on read");
            StoreCounters::incr(&self.counters.evictions);
        }
        None
    }
}
