//! Expiry Sweep Background Task
//!
//! Expired entries are invisible to readers as soon as their TTL passes, but
//! keys nobody reads again would stay in memory forever. This task calls
//! [`CacheStore::sweep`] on a fixed interval so they are reclaimed
//! independently of reads.
//!
//! ```ignore
//! let store = Arc::new(CacheStore::new(config.store.clone()));
//! let sweeper = spawn_sweeper(Arc::clone(&store), config.store.sweep_interval);
//!
//! // On shutdown
//! let snapshot = sweeper.shutdown().await;
//! tracing::info!(entries_swept = snapshot.entries_swept, "Done");
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::CacheStore;

/// Shortest interval the sweeper runs at; shorter requests are raised to it.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity.
#[derive(Debug, Default)]
pub struct SweeperMetrics {
    /// Sweep cycles completed
    pub sweep_cycles: AtomicU64,

    /// Expired entries removed since startup
    pub entries_swept: AtomicU64,
}

impl SweeperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweeperSnapshot {
        SweeperSnapshot {
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            entries_swept: self.entries_swept.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SweeperMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweeperSnapshot {
    pub sweep_cycles: u64,
    pub entries_swept: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep `store` every `sweep_interval` until `shutdown_rx` flips to `true`.
///
/// The first sweep runs immediately. Ticks missed while the runtime was busy
/// are skipped rather than replayed. An interval below [`MIN_SWEEP_INTERVAL`]
/// is raised to it. Returns the metrics collected over the task's lifetime.
pub async fn sweep_task(
    store: Arc<CacheStore>,
    sweep_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweeperMetrics> {
    let metrics = Arc::new(SweeperMetrics::new());

    if sweep_interval < MIN_SWEEP_INTERVAL {
        tracing::warn!(
            requested_ms = sweep_interval.as_millis() as u64,
            min_ms = MIN_SWEEP_INTERVAL.as_millis() as u64,
            "Sweep interval too short, clamping"
        );
    }
    let sweep_interval = sweep_interval.max(MIN_SWEEP_INTERVAL);

    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        sweep_interval_ms = sweep_interval.as_millis() as u64,
        "Cache sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache sweep task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                sweep_once(&store, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweep_cycles = snapshot.sweep_cycles,
        entries_swept = snapshot.entries_swept,
        "Cache sweep task completed"
    );

    metrics
}

fn sweep_once(store: &CacheStore, metrics: &SweeperMetrics) {
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);

    let removed = store.sweep();
    metrics
        .entries_swept
        .fetch_add(removed as u64, Ordering::Relaxed);

    if removed > 0 {
        tracing::debug!(removed, remaining = store.len(), "Swept expired cache entries");
    } else {
        tracing::trace!("Cache sweep found nothing to remove");
    }
}

/// Handle to a spawned sweep task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Arc<SweeperMetrics>>,
}

impl SweeperHandle {
    /// Signal the task to stop and wait for it, returning its final metrics.
    pub async fn shutdown(self) -> SweeperSnapshot {
        let _ = self.shutdown_tx.send(true);
        match self.handle.await {
            Ok(metrics) => metrics.snapshot(),
            Err(e) => {
                tracing::error!(error = %e, "Cache sweep task did not finish cleanly");
                SweeperSnapshot::default()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawn [`sweep_task`] on the current runtime.
pub fn spawn_sweeper(store: Arc<CacheStore>, sweep_interval: Duration) -> SweeperHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(sweep_task(store, sweep_interval, shutdown_rx));
    SweeperHandle {
        shutdown_tx,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutrilog_core::{ManualClock, StoreConfig};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries_on_interval() {
        let clock = ManualClock::at_epoch_2024();
        let store = Arc::new(CacheStore::with_clock(
            StoreConfig::default(),
            Arc::new(clock.clone()),
        ));
        store.put("a", 1u8, Duration::from_secs(10));
        store.put("b", 2u8, Duration::from_secs(1_000));

        let sweeper = spawn_sweeper(Arc::clone(&store), Duration::from_secs(60));

        // Let the immediate first tick run.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.len(), 2);

        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.keys(), vec!["b".to_string()]);

        let snapshot = sweeper.shutdown().await;
        assert_eq!(snapshot.entries_swept, 1);
        assert!(snapshot.sweep_cycles >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped_instead_of_panicking() {
        let clock = ManualClock::at_epoch_2024();
        let store = Arc::new(CacheStore::with_clock(
            StoreConfig::default(),
            Arc::new(clock.clone()),
        ));
        store.put("a", 1u8, Duration::from_secs(1));

        let sweeper = spawn_sweeper(Arc::clone(&store), Duration::ZERO);
        clock.advance(Duration::from_secs(5));
        tokio::time::sleep(MIN_SWEEP_INTERVAL * 3).await;

        assert!(!sweeper.is_finished());
        assert!(store.is_empty());

        let snapshot = sweeper.shutdown().await;
        assert_eq!(snapshot.entries_swept, 1);
        assert!(snapshot.sweep_cycles >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_sender_dropped() {
        let store = Arc::new(CacheStore::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sweep_task(store, Duration::from_secs(1), shutdown_rx));

        drop(shutdown_tx);
        let metrics = handle.await.expect("sweep task should not panic");
        assert!(metrics.snapshot().sweep_cycles <= 1);
    }
}
