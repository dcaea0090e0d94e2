//! Fetch coordinator: one key, one injected fetch, one state machine.
//!
//! A [`FetchCoordinator`] wraps a [`Fetcher`] with the cache store and adds:
//!
//! - **Cache reads**: a non-forced request served by a live store entry never
//!   touches the network.
//! - **De-duplication**: a non-forced request made while this coordinator
//!   already has a request in flight joins it instead of fetching again.
//! - **Rate limiting**: a non-forced request within `min_fetch_interval` of
//!   the last completed attempt is suppressed.
//! - **Supersession**: a forced request cancels the previous one; results are
//!   accepted only from the active [`RequestToken`].
//! - **Retry**: transient failures are retried with exponential backoff timed
//!   by the injected [`RetryScheduler`].
//!
//! ```text
//!            begin()                 Ok
//!   Idle ───────────────► Loading ───────► Succeeded
//!    ▲  ▲                  │   ▲               │
//!    │  │ cancel()         │   │ retry /       │ begin(force)
//!    │  └──────────────────┘   │ begin()       ▼
//!    │                   Err   │           Loading
//!    │                    ▼    │
//!    └── invalidate() ── Failed
//! ```
//!
//! Every state mutation happens under a short synchronous lock; the only
//! suspension points are the fetch itself and backoff delays, both of which
//! run on a spawned task so a triggered request completes even if its caller
//! stops waiting.

pub mod backoff;
pub mod state;
pub mod token;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nutrilog_core::{
    CoordinatorError, FetchError, FetchOptions, Fetcher, RetryScheduler, TokioScheduler,
};
use tokio::sync::watch;

use crate::store::CacheStore;

pub use backoff::{RetryDecision, RetryPolicy};
pub use state::{FetchSnapshot, FetchStatus};
pub use token::RequestToken;

use state::{ActiveRequest, FetchState, Outcome};

// ============================================================================
// DISPATCH
// ============================================================================

/// Result of the synchronous part of a request.
#[derive(Debug)]
pub enum Dispatch<T> {
    /// Answered without waiting: cache hit, rate-limit suppression.
    Ready(Result<T, CoordinatorError>),
    /// A fetch is running (started now or joined).
    Pending(PendingRequest<T>),
}

impl<T: Clone> Dispatch<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> Result<T, CoordinatorError> {
        match self {
            Self::Ready(result) => result,
            Self::Pending(pending) => pending.wait().await,
        }
    }
}

/// Handle on an in-flight logical request (including its retries).
#[derive(Debug)]
pub struct PendingRequest<T> {
    token: RequestToken,
    outcome: watch::Receiver<Outcome<T>>,
}

impl<T: Clone> PendingRequest<T> {
    pub fn token_id(&self) -> u64 {
        self.token.id()
    }

    /// Wait for the request to finish.
    ///
    /// A superseded or cancelled request resolves to
    /// [`CoordinatorError::Cancelled`].
    pub async fn wait(mut self) -> Result<T, CoordinatorError> {
        let result = match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => match &*outcome {
                Some(result) => result.clone(),
                None => Err(CoordinatorError::Cancelled),
            },
            Err(_) => Err(CoordinatorError::Cancelled),
        };
        result
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Per-key fetch state machine over a shared [`CacheStore`].
///
/// Cloning yields another handle to the same coordinator.
pub struct FetchCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FetchCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    key: String,
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher<T>>,
    options: FetchOptions,
    policy: RetryPolicy,
    scheduler: Arc<dyn RetryScheduler>,
    state: Mutex<FetchState<T>>,
    updates: watch::Sender<FetchSnapshot<T>>,
    next_token: AtomicU64,
}

/// Builder for [`FetchCoordinator`].
pub struct CoordinatorBuilder<T> {
    key: String,
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher<T>>,
    options: FetchOptions,
    scheduler: Arc<dyn RetryScheduler>,
}

impl<T> CoordinatorBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn RetryScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn build(self) -> FetchCoordinator<T> {
        let (updates, _) = watch::channel(FetchSnapshot::default());
        FetchCoordinator {
            inner: Arc::new(Inner {
                key: self.key,
                store: self.store,
                fetcher: self.fetcher,
                policy: RetryPolicy::from_options(&self.options),
                options: self.options,
                scheduler: self.scheduler,
                state: Mutex::new(FetchState::default()),
                updates,
                next_token: AtomicU64::new(1),
            }),
        }
    }
}

impl<T> FetchCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start building a coordinator for `key` with default options and
    /// Tokio timers.
    pub fn builder<F>(
        key: impl Into<String>,
        store: Arc<CacheStore>,
        fetcher: F,
    ) -> CoordinatorBuilder<T>
    where
        F: Fetcher<T> + 'static,
    {
        CoordinatorBuilder {
            key: key.into(),
            store,
            fetcher: Arc::new(fetcher),
            options: FetchOptions::default(),
            scheduler: Arc::new(TokioScheduler),
        }
    }

    /// Coordinator with default options and Tokio timers.
    pub fn new<F>(key: impl Into<String>, store: Arc<CacheStore>, fetcher: F) -> Self
    where
        F: Fetcher<T> + 'static,
    {
        Self::builder(key, store, fetcher).build()
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn options(&self) -> &FetchOptions {
        &self.inner.options
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    /// Request the value, fetching only when needed.
    ///
    /// With `force_refresh` the cache, the in-flight request and the rate
    /// limit are all bypassed and any previous request is superseded.
    pub async fn request(&self, force_refresh: bool) -> Result<T, CoordinatorError> {
        self.begin(force_refresh).wait().await
    }

    /// Synchronous part of [`request`](Self::request).
    ///
    /// Any fetch is started on a spawned task before this returns, so the
    /// returned [`Dispatch`] may be awaited later or dropped. Must be called
    /// within a Tokio runtime.
    pub fn begin(&self, force_refresh: bool) -> Dispatch<T> {
        let inner = &self.inner;
        let (token, tx, rx) = {
            let mut state = inner.lock();

            if !force_refresh {
                if let Some(ready) = inner.answer_without_fetch(&mut state) {
                    return ready;
                }
            }

            if let Some(previous) = state.active.take() {
                tracing::debug!(
                    key = %inner.key,
                    superseded = previous.token.id(),
                    "Superseding in-flight request"
                );
                previous.token.cancel();
            }

            let token = RequestToken::new(inner.next_token.fetch_add(1, Ordering::Relaxed));
            let (tx, rx) = watch::channel(None);
            state.status = FetchStatus::Loading;
            state.error = None;
            state.retry_count = 0;
            state.active = Some(ActiveRequest {
                token: token.clone(),
                outcome: rx.clone(),
            });
            inner.publish(&state);
            (token, tx, rx)
        };

        tracing::debug!(key = %inner.key, token = token.id(), force_refresh, "Starting fetch");
        tokio::spawn(Arc::clone(inner).drive(token.clone(), tx));

        Dispatch::Pending(PendingRequest { token, outcome: rx })
    }

    /// Drop the cached value for this key and fetch unconditionally.
    pub async fn refresh(&self) -> Result<T, CoordinatorError> {
        self.inner.store.invalidate_key(&self.inner.key);
        self.request(true).await
    }

    /// Drop the cached value, cancel any in-flight request and reset to
    /// `Idle` without fetching.
    pub fn invalidate(&self) {
        let inner = &self.inner;
        inner.store.invalidate_key(&inner.key);

        let mut state = inner.lock();
        if let Some(active) = state.active.take() {
            active.token.cancel();
        }
        *state = FetchState::default();
        inner.publish(&state);
        tracing::debug!(key = %inner.key, "Coordinator invalidated");
    }

    /// Cancel the in-flight request, if any. Data is kept.
    ///
    /// Returns whether there was something to cancel.
    pub fn cancel(&self) -> bool {
        let inner = &self.inner;
        let mut state = inner.lock();
        let Some(active) = state.active.take() else {
            return false;
        };

        active.token.cancel();
        if state.status == FetchStatus::Loading {
            state.status = FetchStatus::Idle;
        }
        inner.publish(&state);
        tracing::debug!(key = %inner.key, token = active.token.id(), "Request cancelled");
        true
    }

    pub fn snapshot(&self) -> FetchSnapshot<T> {
        self.inner.lock().snapshot()
    }

    /// Receive a new snapshot on every state change.
    pub fn subscribe(&self) -> watch::Receiver<FetchSnapshot<T>> {
        self.inner.updates.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().status == FetchStatus::Loading
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, FetchState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &FetchState<T>) {
        self.updates.send_replace(state.snapshot());
    }

    /// Cache hit, join, or rate-limit suppression. `None` means fetch.
    fn answer_without_fetch(&self, state: &mut FetchState<T>) -> Option<Dispatch<T>> {
        if let Some(value) = self.store.get::<T>(&self.key) {
            if state.active.is_none() {
                state.status = FetchStatus::Succeeded;
                state.error = None;
            }
            state.data = Some(value.clone());
            self.publish(state);
            return Some(Dispatch::Ready(Ok(value)));
        }

        if let Some(active) = &state.active {
            tracing::debug!(
                key = %self.key,
                token = active.token.id(),
                "Joining in-flight request"
            );
            return Some(Dispatch::Pending(PendingRequest {
                token: active.token.clone(),
                outcome: active.outcome.clone(),
            }));
        }

        let last = state.last_fetch_at?;
        let elapsed = self
            .store
            .now()
            .signed_duration_since(last)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed >= self.options.min_fetch_interval {
            return None;
        }

        let retry_after = self.options.min_fetch_interval - elapsed;
        tracing::debug!(
            key = %self.key,
            retry_after_ms = retry_after.as_millis() as u64,
            "Request suppressed by rate limit"
        );
        Some(Dispatch::Ready(match &state.data {
            Some(data) => Ok(data.clone()),
            None => Err(CoordinatorError::RateLimited { retry_after }),
        }))
    }

    /// Run one logical request to completion and publish its outcome.
    async fn drive(self: Arc<Self>, token: RequestToken, tx: watch::Sender<Outcome<T>>) {
        let outcome = self.attempt_until_done(&token).await;
        if let Err(CoordinatorError::Cancelled) = &outcome {
            tracing::debug!(key = %self.key, token = token.id(), "Discarding cancelled request");
        }
        tx.send_replace(Some(outcome));
    }

    async fn attempt_until_done(&self, token: &RequestToken) -> Result<T, CoordinatorError> {
        loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(CoordinatorError::Cancelled),
                result = self.fetcher.fetch(token.child()) => result,
            };

            let delay = match result {
                Ok(value) => {
                    return if self.complete_success(token, &value) {
                        Ok(value)
                    } else {
                        Err(CoordinatorError::Cancelled)
                    };
                }
                Err(error) => match self.complete_failure(token, &error) {
                    None => return Err(CoordinatorError::Cancelled),
                    Some(RetryDecision::Surface(err)) => return Err(err),
                    Some(RetryDecision::Retry { delay }) => delay,
                },
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(CoordinatorError::Cancelled),
                _ = self.scheduler.sleep(delay) => {}
            }

            if !self.begin_retry(token) {
                return Err(CoordinatorError::Cancelled);
            }
        }
    }

    /// Record a successful attempt. `false` if `token` no longer owns the state.
    fn complete_success(&self, token: &RequestToken, value: &T) -> bool {
        let mut state = self.lock();
        if !state.owns(token) {
            return false;
        }

        self.store.put(self.key.clone(), value.clone(), self.options.ttl);
        state.status = FetchStatus::Succeeded;
        state.data = Some(value.clone());
        state.error = None;
        state.retry_count = 0;
        state.last_fetch_at = Some(self.store.now());
        state.active = None;
        self.publish(&state);
        tracing::debug!(key = %self.key, token = token.id(), "Fetch succeeded");
        true
    }

    /// Record a failed attempt and decide what follows. `None` if `token` no
    /// longer owns the state.
    fn complete_failure(&self, token: &RequestToken, error: &FetchError) -> Option<RetryDecision> {
        let mut state = self.lock();
        if !state.owns(token) {
            return None;
        }

        state.status = FetchStatus::Failed;
        state.error = Some(error.to_string());
        state.last_fetch_at = Some(self.store.now());

        let decision = self.policy.decide(error, state.retry_count);
        match &decision {
            RetryDecision::Retry { delay } => {
                tracing::warn!(
                    key = %self.key,
                    attempt = state.retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Fetch attempt failed, retrying"
                );
            }
            RetryDecision::Surface(err) => {
                state.active = None;
                tracing::warn!(
                    key = %self.key,
                    attempt = state.retry_count + 1,
                    error = %err,
                    "Fetch failed"
                );
            }
        }
        self.publish(&state);
        Some(decision)
    }

    /// Move back to `Loading` for the next attempt of the same request.
    fn begin_retry(&self, token: &RequestToken) -> bool {
        let mut state = self.lock();
        if !state.owns(token) {
            return false;
        }

        state.retry_count += 1;
        state.status = FetchStatus::Loading;
        state.error = None;
        self.publish(&state);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutrilog_core::{CancellationToken, ManualClock, StoreConfig};
    use std::sync::atomic::AtomicUsize;

    fn store() -> (Arc<CacheStore>, ManualClock) {
        let clock = ManualClock::at_epoch_2024();
        let store = CacheStore::with_clock(StoreConfig::default(), Arc::new(clock.clone()));
        (Arc::new(store), clock)
    }

    fn counting_fetcher(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(CancellationToken) -> std::future::Ready<Result<u32, FetchError>> + Send + Sync {
        move |_cancel| {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
            std::future::ready(Ok(n))
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch() {
        let (store, _clock) = store();
        store.put("k", 99u32, Duration::from_secs(60));

        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator: FetchCoordinator<u32> =
            FetchCoordinator::new("k", Arc::clone(&store), counting_fetcher(Arc::clone(&calls)));

        assert_eq!(coordinator.request(false).await, Ok(99));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.status, FetchStatus::Succeeded);
        assert_eq!(snapshot.data, Some(99));
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let (store, _clock) = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator: FetchCoordinator<u32> =
            FetchCoordinator::new("k", Arc::clone(&store), counting_fetcher(Arc::clone(&calls)));

        assert_eq!(coordinator.request(false).await, Ok(1));
        assert_eq!(store.get::<u32>("k"), Some(1));
        assert_eq!(coordinator.snapshot().retry_count, 0);
        assert!(!coordinator.is_loading());
    }

    #[tokio::test]
    async fn test_forced_request_bypasses_cache() {
        let (store, _clock) = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator: FetchCoordinator<u32> =
            FetchCoordinator::new("k", Arc::clone(&store), counting_fetcher(Arc::clone(&calls)));

        assert_eq!(coordinator.request(false).await, Ok(1));
        assert_eq!(coordinator.request(true).await, Ok(2));
        assert_eq!(store.get::<u32>("k"), Some(2));
    }

    #[tokio::test]
    async fn test_invalidate_resets_to_idle() {
        let (store, _clock) = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator: FetchCoordinator<u32> =
            FetchCoordinator::new("k", Arc::clone(&store), counting_fetcher(Arc::clone(&calls)));

        coordinator.request(false).await.expect("first fetch should succeed");
        coordinator.invalidate();

        assert!(!store.contains("k"));
        assert_eq!(coordinator.snapshot(), FetchSnapshot::default());

        // No rate-limit history survives invalidation.
        assert_eq!(coordinator.request(false).await, Ok(2));
    }

    #[tokio::test]
    async fn test_cancel_without_request_is_noop() {
        let (store, _clock) = store();
        let coordinator: FetchCoordinator<u32> =
            FetchCoordinator::new("k", store, counting_fetcher(Arc::new(AtomicUsize::new(0))));
        assert!(!coordinator.cancel());
        assert_eq!(coordinator.snapshot().status, FetchStatus::Idle);
    }

    #[tokio::test]
    async fn test_subscribe_sees_loading_then_success() {
        let (store, _clock) = store();
        let coordinator: FetchCoordinator<u32> =
            FetchCoordinator::new("k", store, counting_fetcher(Arc::new(AtomicUsize::new(0))));
        let mut updates = coordinator.subscribe();

        let pending = coordinator.begin(false);
        assert!(pending.is_pending());
        assert!(updates.borrow_and_update().is_loading);

        assert_eq!(pending.wait().await, Ok(1));
        let latest = updates.borrow_and_update().clone();
        assert_eq!(latest.status, FetchStatus::Succeeded);
        assert_eq!(latest.data, Some(1));
    }
}
