//! nutrilog Test Utilities
//!
//! Shared test infrastructure for the nutrilog workspace:
//! - Scripted fetchers with per-call latency and results
//! - A recording retry scheduler and error sink
//! - Test fixtures for meals and fast-retry options
//! - Proptest generators for keys, TTLs and meals
//! - Custom assertions on coordinator results

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

// Re-export core types for convenience
pub use nutrilog_core::{
    CancellationToken, Clock, CoordinatorError, ErrorSink, FetchError, FetchOptions, ManualClock,
    Meal, MealId, NutrilogError, RetryScheduler, StoreConfig, Timestamp,
};

// ============================================================================
// SCRIPTED FETCHER
// ============================================================================

/// Boxed future returned by [`ScriptedFetcher::fetcher`].
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>>;

#[derive(Debug, Clone)]
struct Step<T> {
    latency: Duration,
    result: Result<T, FetchError>,
}

struct Script<T> {
    steps: Mutex<VecDeque<Step<T>>>,
    fallback: Mutex<Option<Step<T>>>,
    calls: AtomicUsize,
    aborted: AtomicUsize,
}

/// Fetch operation that replays a scripted sequence of responses.
///
/// Each call consumes the next step: it waits the step's latency on the
/// Tokio clock (so paused-time tests advance instantly), then yields the
/// step's result. Once the script runs out the fallback repeats. A call whose
/// token is cancelled during the latency is counted as aborted.
///
/// ```ignore
/// let script = ScriptedFetcher::new()
///     .then_ok(Meal..., Duration::from_millis(100))
///     .always_err(FetchError::transient("503"));
/// let coordinator = FetchCoordinator::new(key, store, script.fetcher());
/// assert_eq!(script.calls(), 0);
/// ```
pub struct ScriptedFetcher<T> {
    script: Arc<Script<T>>,
}

impl<T> Clone for ScriptedFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
        }
    }
}

impl<T> Default for ScriptedFetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ScriptedFetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script {
                steps: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                calls: AtomicUsize::new(0),
                aborted: AtomicUsize::new(0),
            }),
        }
    }

    /// Every call succeeds immediately with `value`.
    pub fn always(value: T) -> Self {
        Self::new().always_ok(value)
    }

    /// Every call fails immediately with `error`.
    pub fn failing(error: FetchError) -> Self {
        Self::new().always_err(error)
    }

    pub fn then_ok(self, value: T, latency: Duration) -> Self {
        self.push(Ok(value), latency)
    }

    pub fn then_err(self, error: FetchError, latency: Duration) -> Self {
        self.push(Err(error), latency)
    }

    pub fn always_ok(self, value: T) -> Self {
        self.set_fallback(Ok(value), Duration::ZERO)
    }

    pub fn always_err(self, error: FetchError) -> Self {
        self.set_fallback(Err(error), Duration::ZERO)
    }

    /// Fallback with latency, for "every call takes 100 ms" scripts.
    pub fn always_after(self, value: T, latency: Duration) -> Self {
        self.set_fallback(Ok(value), latency)
    }

    /// Number of fetches started.
    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Number of fetches that observed cancellation before finishing.
    pub fn aborted(&self) -> usize {
        self.script.aborted.load(Ordering::SeqCst)
    }

    /// The fetch closure to hand to a coordinator.
    pub fn fetcher(&self) -> impl Fn(CancellationToken) -> FetchFuture<T> + Send + Sync + 'static {
        let script = Arc::clone(&self.script);
        move |cancel: CancellationToken| {
            let script = Arc::clone(&script);
            Box::pin(async move { script.run(cancel).await }) as FetchFuture<T>
        }
    }

    fn push(self, result: Result<T, FetchError>, latency: Duration) -> Self {
        self.script
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Step { latency, result });
        self
    }

    fn set_fallback(self, result: Result<T, FetchError>, latency: Duration) -> Self {
        *self
            .script
            .fallback
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Step { latency, result });
        self
    }
}

impl<T> Script<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn next_step(&self) -> Option<Step<T>> {
        let scripted = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted.or_else(|| {
            self.fallback
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        })
    }

    async fn run(&self, cancel: CancellationToken) -> Result<T, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(step) = self.next_step() else {
            return Err(FetchError::permanent("fetch script exhausted"));
        };

        if !step.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.aborted.fetch_add(1, Ordering::SeqCst);
                    return Err(FetchError::transient("aborted"));
                }
                _ = tokio::time::sleep(step.latency) => {}
            }
        }
        step.result
    }
}

// ============================================================================
// RECORDING SCHEDULER
// ============================================================================

/// Retry scheduler that records each requested delay instead of sleeping.
///
/// Optionally advances a [`ManualClock`] by the delay so cache and
/// rate-limit decisions see the time pass.
#[derive(Debug, Clone, Default)]
pub struct RecordingScheduler {
    delays: Arc<Mutex<Vec<Duration>>>,
    clock: Option<ManualClock>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            delays: Arc::default(),
            clock: Some(clock),
        }
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl RetryScheduler for RecordingScheduler {
    async fn sleep(&self, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(delay);
        if let Some(clock) = &self.clock {
            clock.advance(delay);
        }
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// RECORDING ERROR SINK
// ============================================================================

/// One report received by a [`RecordingErrorSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub error: NutrilogError,
    pub context: String,
}

/// Error sink that keeps everything reported to it.
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorSink {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, error: &NutrilogError, context: &str) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Report {
                error: error.clone(),
                context: context.to_string(),
            });
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::DateTime;

    /// 2024-01-01 00:00:00 UTC plus `secs`.
    pub fn timestamp(secs: i64) -> Timestamp {
        DateTime::from_timestamp(1_704_067_200 + secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// A meal with round-number macros.
    pub fn meal(id: &str) -> Meal {
        Meal {
            id: MealId::new(id),
            name: format!("meal {id}"),
            calories: 500.0,
            protein_g: 30.0,
            carbs_g: 50.0,
            fat_g: 20.0,
            image_url: None,
            is_favorite: false,
            created_at: timestamp(0),
        }
    }

    /// `count` meals with ids `"1"..="count"`, one minute apart.
    pub fn meal_history(count: usize) -> Vec<Meal> {
        (1..=count)
            .map(|i| Meal {
                created_at: timestamp(60 * i as i64),
                ..meal(&i.to_string())
            })
            .collect()
    }

    /// Default options with retries enabled and the default backoff.
    pub fn default_options() -> FetchOptions {
        FetchOptions::default()
    }

    /// Options with no rate limit, for tests that issue back-to-back calls.
    pub fn unthrottled_options() -> FetchOptions {
        FetchOptions::default().with_min_fetch_interval(Duration::ZERO)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache keys, TTLs and meals.

    use super::*;
    use proptest::prelude::*;

    /// Keys of the shape `<namespace>:<id>`.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("meals"), Just("profile"), Just("stats")],
            "[a-z0-9]{1,8}",
        )
            .prop_map(|(ns, id)| format!("{ns}:{id}"))
    }

    /// TTLs from 1 s to 1 h, in whole milliseconds.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1_000u64..3_600_000).prop_map(Duration::from_millis)
    }

    pub fn arb_fetch_error() -> impl Strategy<Value = FetchError> {
        ("[a-z ]{1,16}", any::<bool>()).prop_map(|(msg, retryable)| {
            if retryable {
                FetchError::transient(msg)
            } else {
                FetchError::permanent(msg)
            }
        })
    }

    pub fn arb_meal() -> impl Strategy<Value = Meal> {
        (
            "[0-9]{1,6}",
            "[A-Za-z ]{1,20}",
            0.0f64..2000.0,
            0.0f64..200.0,
            any::<bool>(),
        )
            .prop_map(|(id, name, calories, protein_g, is_favorite)| Meal {
                name,
                calories,
                protein_g,
                is_favorite,
                ..fixtures::meal(&id)
            })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on coordinator results.

    use super::*;

    /// Assert that a request was cancelled.
    #[track_caller]
    pub fn assert_cancelled<T: std::fmt::Debug>(result: &Result<T, CoordinatorError>) {
        match result {
            Err(CoordinatorError::Cancelled) => {}
            other => panic!("Expected Cancelled, got: {:?}", other),
        }
    }

    /// Assert that a request gave up after exactly `attempts` fetches.
    #[track_caller]
    pub fn assert_retries_exhausted<T: std::fmt::Debug>(
        result: &Result<T, CoordinatorError>,
        attempts: u32,
    ) {
        match result {
            Err(CoordinatorError::RetriesExhausted { attempts: got, .. }) => {
                assert_eq!(*got, attempts, "Wrong attempt count in RetriesExhausted");
            }
            other => panic!("Expected RetriesExhausted, got: {:?}", other),
        }
    }

    /// Assert that a request was suppressed by the rate limit.
    #[track_caller]
    pub fn assert_rate_limited<T: std::fmt::Debug>(result: &Result<T, CoordinatorError>) {
        match result {
            Err(CoordinatorError::RateLimited { .. }) => {}
            other => panic!("Expected RateLimited, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
