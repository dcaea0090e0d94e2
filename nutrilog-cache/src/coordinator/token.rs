//! Identity and cancellation handle for one logical request.

use std::fmt;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Identifies the in-flight request of a coordinator.
///
/// Results are accepted only from the token that is still active, so a
/// superseded request can never write state even if it resolves last.
/// Retries of the same logical request keep their token.
#[derive(Clone)]
pub struct RequestToken {
    id: u64,
    cancel: CancellationToken,
}

impl RequestToken {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Abort signal handed to the fetch; cancelled with this token.
    pub fn child(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}

impl PartialEq for RequestToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RequestToken {}

impl fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestToken")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
