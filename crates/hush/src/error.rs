//! Unified error type for Hush.

use hush_identity::IdentityError;
use hush_limits::LimitError;
use hush_session::SessionError;
use hush_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `hush` meta-crate, you deal with this single error type
/// instead of importing errors from each sub-crate. `?` converts sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HushError {
    /// The store failed or timed out.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Id generation or scratchpad encoding failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A session-level error (not found, invalid field).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An action-limit error (throttled, plan lookup).
    #[error(transparent)]
    Limit(#[from] LimitError),
}

impl HushError {
    /// Returns `true` if the session is simply not there. Callers treat
    /// the request as anonymous.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Session(e) if e.is_not_found())
    }

    /// Returns `true` if the action was refused by a plan ceiling.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Limit(e) if e.is_throttled())
    }

    /// Returns `true` if retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) | Self::Limit(LimitError::Store(e)) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Identity(_) | Self::Limit(_) => false,
        }
    }
}
