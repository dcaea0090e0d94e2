//! Timer abstraction for retry backoff.

use std::time::Duration;

use async_trait::async_trait;

/// Waits out a backoff delay before the next retry attempt.
///
/// Production code sleeps on the Tokio timer; tests substitute a scheduler
/// that records the requested delays and returns immediately.
#[async_trait]
pub trait RetryScheduler: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl RetryScheduler for TokioScheduler {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_waits_for_delay() {
        let start = tokio::time::Instant::now();
        TokioScheduler.sleep(Duration::from_secs(4)).await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }
}
