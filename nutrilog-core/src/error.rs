//! Error types for nutrilog operations

use std::time::Duration;
use thiserror::Error;

/// Failure reported by an injected fetch operation.
///
/// The `retryable` flag is how a fetch tells the coordinator whether a
/// failure is transient (network, 5xx) or a client error that retrying
/// cannot fix (bad input, permission denied).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    message: String,
    retryable: bool,
}

impl FetchError {
    /// A transient failure; the coordinator may retry it with backoff.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that retrying will not fix; surfaced immediately.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Fetch coordinator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Fetch failed: {0}")]
    Fetch(FetchError),

    #[error("Fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: FetchError },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request suppressed by rate limit, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

impl CoordinatorError {
    /// Whether an end user should ever see this error.
    ///
    /// Cancellation and rate-limit suppression are control flow, not failures.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::RetriesExhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The underlying fetch error, if the request actually failed.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::Cancelled | Self::RateLimited { .. } => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Master error type for all nutrilog errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NutrilogError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl NutrilogError {
    pub fn is_user_visible(&self) -> bool {
        match self {
            Self::Coordinator(err) => err.is_user_visible(),
            Self::Fetch(_) | Self::Config(_) => true,
        }
    }
}

/// Result type alias for nutrilog operations.
pub type NutrilogResult<T> = Result<T, NutrilogError>;

// =============================================================================
// TESTS
// =============================================================================
