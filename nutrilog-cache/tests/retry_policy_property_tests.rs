//! Property-Based Tests for Retry Decisions
//!
//! **Property 5: Backoff schedule**
//! Retryable errors are retried while budget remains, with a delay that
//! never exceeds the cap; everything else surfaces without a retry.

use std::time::Duration;

use nutrilog_cache::{RetryDecision, RetryPolicy};
use nutrilog_test_utils::generators::arb_fetch_error;
use nutrilog_test_utils::{CoordinatorError, FetchOptions};
use proptest::prelude::*;

fn policy(max_retries: u32, enabled: bool) -> RetryPolicy {
    RetryPolicy::from_options(
        &FetchOptions::default()
            .with_max_retries(max_retries)
            .with_retry_on_error(enabled),
    )
}

proptest! {
    #[test]
    fn prop_decision_follows_retryability_and_budget(
        error in arb_fetch_error(),
        max_retries in 0u32..6,
        retry_count in 0u32..10,
    ) {
        let policy = policy(max_retries, true);
        let decision = policy.decide(&error, retry_count);

        if !error.is_retryable() {
            prop_assert_eq!(decision, RetryDecision::Surface(CoordinatorError::Fetch(error)));
        } else if retry_count < max_retries {
            prop_assert_eq!(
                decision,
                RetryDecision::Retry { delay: policy.delay_for(retry_count) }
            );
        } else if retry_count == 0 {
            prop_assert_eq!(decision, RetryDecision::Surface(CoordinatorError::Fetch(error)));
        } else {
            prop_assert_eq!(
                decision,
                RetryDecision::Surface(CoordinatorError::RetriesExhausted {
                    attempts: retry_count + 1,
                    last: error,
                })
            );
        }
    }

    #[test]
    fn prop_disabled_retries_never_retry(
        error in arb_fetch_error(),
        retry_count in 0u32..10,
    ) {
        let decision = policy(3, false).decide(&error, retry_count);
        prop_assert_eq!(decision, RetryDecision::Surface(CoordinatorError::Fetch(error)));
    }

    #[test]
    fn prop_delay_is_monotonic_and_capped(retry_count in 0u32..64) {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(retry_count);
        prop_assert!(delay <= policy.max);
        prop_assert!(delay >= policy.delay_for(retry_count.saturating_sub(1)));
        prop_assert!(delay >= Duration::from_secs(1));
    }
}
