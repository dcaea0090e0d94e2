//! Retry decisions and exponential backoff delays.

use std::time::Duration;

use nutrilog_core::{CoordinatorError, FetchError, FetchOptions};

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then try again.
    Retry { delay: Duration },
    /// Give up and surface this error.
    Surface(CoordinatorError),
}

/// Retry policy derived from [`FetchOptions`].
///
/// Delay before retry `n` (0-based) is `initial * 2^n`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_options(options: &FetchOptions) -> Self {
        Self {
            enabled: options.retry_on_error,
            max_retries: options.max_retries,
            initial: options.initial_backoff,
            max: options.max_backoff,
        }
    }

    /// Backoff before the retry following `retry_count` earlier retries.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Decide what follows a failure, given how many retries already ran.
    pub fn decide(&self, error: &FetchError, retry_count: u32) -> RetryDecision {
        if !self.enabled || !error.is_retryable() {
            return RetryDecision::Surface(CoordinatorError::Fetch(error.clone()));
        }

        if retry_count < self.max_retries {
            return RetryDecision::Retry {
                delay: self.delay_for(retry_count),
            };
        }

        if retry_count == 0 {
            RetryDecision::Surface(CoordinatorError::Fetch(error.clone()))
        } else {
            RetryDecision::Surface(CoordinatorError::RetriesExhausted {
                attempts: retry_count + 1,
                last: error.clone(),
            })
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&FetchOptions::default())
    }
}
