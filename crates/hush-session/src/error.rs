//! Error types for the session layer.

use hush_identity::IdentityError;
use hush_store::StoreError;

/// Errors that can occur during session management.
///
/// The split between [`NotFound`](Self::NotFound) and
/// [`Store`](Self::Store) matters to callers: the first means "treat this
/// request as anonymous", the second means "the store is having trouble,
/// try again". A timeout is never reported as `NotFound`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No live session exists under this id (never created, expired, or
    /// deleted). Carries the short identifier, never the raw id.
    #[error("session not found: {0}")]
    NotFound(String),

    /// `update_fields` was handed a field that is unknown or not
    /// writable through a patch.
    #[error("invalid session field: {0}")]
    InvalidField(String),

    /// The store failed or timed out.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A session id could not be generated.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl SessionError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }

    /// Returns `true` for [`NotFound`](Self::NotFound).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_timeout_is_retryable_not_not_found() {
        let err: SessionError = StoreError::Timeout(Duration::from_secs(2)).into();

        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        let err = SessionError::NotFound("abcdef012345".into());

        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "session not found: abcdef012345");
    }

    #[test]
    fn test_generation_failure_is_not_retryable() {
        let err: SessionError = IdentityError::Generation("no entropy".into()).into();

        assert!(!err.is_retryable());
        assert!(err.to_string().contains("no entropy"));
    }
}
