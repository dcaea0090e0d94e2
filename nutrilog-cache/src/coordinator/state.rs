//! Per-coordinator request state and its outbound snapshot.

use std::fmt;

use nutrilog_core::{CoordinatorError, Timestamp};
use tokio::sync::watch;

use super::token::RequestToken;

/// Lifecycle of a coordinator's most recent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a consumer sees of a coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSnapshot<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub retry_count: u32,
    pub status: FetchStatus,
}

impl<T> Default for FetchSnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            retry_count: 0,
            status: FetchStatus::Idle,
        }
    }
}

/// Final result shared with every caller of one logical request.
pub(crate) type Outcome<T> = Option<Result<T, CoordinatorError>>;

/// The request a coordinator currently owns.
pub(crate) struct ActiveRequest<T> {
    pub token: RequestToken,
    pub outcome: watch::Receiver<Outcome<T>>,
}

pub(crate) struct FetchState<T> {
    pub status: FetchStatus,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Completion time of the last attempt, success or failure.
    pub last_fetch_at: Option<Timestamp>,
    pub retry_count: u32,
    pub active: Option<ActiveRequest<T>>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            status: FetchStatus::Idle,
            data: None,
            error: None,
            last_fetch_at: None,
            retry_count: 0,
            active: None,
        }
    }
}

impl<T: Clone> FetchState<T> {
    /// Whether `token` is still the one allowed to write this state.
    pub fn owns(&self, token: &RequestToken) -> bool {
        !token.is_cancelled()
            && self
                .active
                .as_ref()
                .is_some_and(|active| active.token == *token)
    }

    pub fn snapshot(&self) -> FetchSnapshot<T> {
        FetchSnapshot {
            data: self.data.clone(),
            is_loading: self.status == FetchStatus::Loading,
            error: self.error.clone(),
            retry_count: self.retry_count,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_idle() {
        let state = FetchState::<u32>::default();
        let snapshot = state.snapshot();
        assert_eq!(snapshot, FetchSnapshot::default());
        assert_eq!(snapshot.status.to_string(), "idle");
    }

    #[test]
    fn test_owns_requires_matching_live_token() {
        let mut state = FetchState::<u32>::default();
        let token = RequestToken::new(1);
        assert!(!state.owns(&token));

        let (_tx, rx) = watch::channel(None);
        state.active = Some(ActiveRequest {
            token: token.clone(),
            outcome: rx,
        });
        assert!(state.owns(&token));
        assert!(!state.owns(&RequestToken::new(2)));

        token.cancel();
        assert!(!state.owns(&token));
    }

    #[test]
    fn test_snapshot_reports_loading() {
        let state = FetchState {
            status: FetchStatus::Loading,
            data: Some(3u32),
            ..FetchState::default()
        };
        let snapshot = state.snapshot();
        assert!(snapshot.is_loading);
        assert_eq!(snapshot.data, Some(3));
    }
}
