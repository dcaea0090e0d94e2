//! Error-reporting sink for user-facing failures.

use crate::error::NutrilogError;

/// Receives `(error, context)` pairs for display to the end user.
///
/// `context` names the screen or operation that failed, e.g. `"history"`.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &NutrilogError, context: &str);
}

/// Sink that logs reported errors through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &NutrilogError, context: &str) {
        tracing::error!(context, error = %error, "Request failed");
    }
}
