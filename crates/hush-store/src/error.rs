use std::time::Duration;

/// Errors that can occur in the store layer.
///
/// A missing key is NOT an error — see [`KeyedStore`](crate::KeyedStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The operation did not complete within the configured bound.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store could not be reached (refused, dropped, I/O failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered, but with an error.
    #[error("store error: {0}")]
    Backend(String),

    /// A stored value could not be interpreted.
    #[error("corrupt value in field `{field}`: {reason}")]
    Corrupt { field: String, reason: String },
}

impl StoreError {
    /// Returns `true` if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout()
            || err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            Self::Unavailable(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_timeout_and_unavailable() {
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(StoreError::Unavailable("refused".into()).is_retryable());
    }

    #[test]
    fn test_is_retryable_backend_and_corrupt_are_not() {
        assert!(!StoreError::Backend("WRONGTYPE".into()).is_retryable());
        let corrupt = StoreError::Corrupt {
            field: "count".into(),
            reason: "not a number".into(),
        };
        assert!(!corrupt.is_retryable());
        assert!(corrupt.to_string().contains("count"));
    }
}
