//! The injected fetch operation wrapped by a coordinator.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Zero-argument asynchronous operation producing a `T` or failing.
///
/// The token is cancelled when the request is superseded or its consumer
/// detaches. Implementations that can abort early (dropping an HTTP request,
/// stopping a stream) should watch it; implementations that cannot may
/// ignore it, since a cancelled request's result is discarded regardless.
///
/// Any `Fn(CancellationToken) -> impl Future<Output = Result<T, FetchError>>`
/// is a fetcher:
///
/// ```ignore
/// let api = Arc::clone(&api);
/// let fetcher = move |_cancel: CancellationToken| {
///     let api = Arc::clone(&api);
///     async move { api.list_meals().await }
/// };
/// ```
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    async fn fetch(&self, cancel: CancellationToken) -> Result<T, FetchError>;
}

#[async_trait]
impl<T, F, Fut> Fetcher<T> for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    T: Send + 'static,
{
    async fn fetch(&self, cancel: CancellationToken) -> Result<T, FetchError> {
        (self)(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_closure_is_a_fetcher() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetcher = move |_cancel: CancellationToken| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FetchError>(7u32)
            }
        };

        let boxed: Arc<dyn Fetcher<u32>> = Arc::new(fetcher);
        assert_eq!(boxed.fetch(CancellationToken::new()).await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetcher_sees_cancellation() {
        let fetcher = |cancel: CancellationToken| async move {
            if cancel.is_cancelled() {
                Err(FetchError::permanent("aborted"))
            } else {
                Ok(1u8)
            }
        };
        let token = CancellationToken::new();
        token.cancel();
        assert!(fetcher.fetch(token).await.is_err());
    }
}
