//! Error types for the limits layer.

use hush_store::StoreError;

/// Errors that can occur while counting or limiting actions.
#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    /// The session has passed its plan's ceiling for this action in the
    /// current window. The caller should answer with a rate-limit response.
    #[error("action {action} throttled: {count} of {limit} allowed")]
    Throttled {
        action: String,
        count: u64,
        limit: u64,
    },

    /// The store failed or timed out. The action was not counted as
    /// refused; retrying may succeed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session's plan could not be resolved.
    #[error("plan lookup failed: {0}")]
    Plan(String),
}

impl LimitError {
    /// Returns `true` for [`Throttled`](Self::Throttled).
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}
