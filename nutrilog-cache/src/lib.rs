//! nutrilog Cache - TTL Store, Fetch Coordinator and Lifecycle Binder
//!
//! Client-side data cache for the food log: a shared [`CacheStore`] with
//! per-entry TTL, a per-key [`FetchCoordinator`] that de-duplicates,
//! rate-limits, supersedes and retries fetches, and a [`LifecycleBinder`]
//! that drives a coordinator from a screen's attach/focus/detach events.

pub mod coordinator;
pub mod keys;
pub mod lifecycle;
pub mod store;

pub use coordinator::{
    CoordinatorBuilder, Dispatch, FetchCoordinator, FetchSnapshot, FetchStatus, PendingRequest,
    RequestToken, RetryDecision, RetryPolicy,
};
pub use lifecycle::{LifecycleBinder, LifecycleEvent};
pub use store::{
    spawn_sweeper, sweep_task, CacheEntry, CacheStats, CacheStore, InvalidateScope,
    SweeperHandle, SweeperMetrics, SweeperSnapshot,
};
