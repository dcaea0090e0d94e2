//! nutrilog Core - Types, Errors and Configuration
//!
//! Shared vocabulary for the nutrilog data cache: the error taxonomy, cache
//! and fetch configuration, the clock and retry-timer abstractions, the
//! injected [`Fetcher`] trait, and the collaborator interfaces (meal API,
//! error sink) the cache is wired to.

pub mod api;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod meal;
pub mod schedule;
pub mod sink;

pub use api::{InMemoryMealApi, MealApi};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{FetchOptions, NutrilogConfig, StoreConfig};
pub use error::{
    ConfigError, CoordinatorError, FetchError, NutrilogError, NutrilogResult,
};
pub use fetch::Fetcher;
pub use meal::{Meal, MealFeedback, MealId};
pub use schedule::{RetryScheduler, TokioScheduler};
pub use sink::{ErrorSink, TracingErrorSink};

// Re-exported so fetcher implementations don't need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
