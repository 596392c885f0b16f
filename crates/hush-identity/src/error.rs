//! Error types for the identity layer.

/// Errors that can occur while minting identifiers or encoding the form
/// scratchpad.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The operating system's secure random source failed.
    ///
    /// Fatal for the request. There is no weaker fallback source; no
    /// session id is produced at all.
    #[error("secure random source unavailable: {0}")]
    Generation(String),

    /// The form scratchpad could not be serialized.
    #[error("form fields encode failed: {0}")]
    Encode(serde_json::Error),

    /// A stored form scratchpad blob was not a JSON object of strings.
    #[error("form fields decode failed: {0}")]
    Decode(serde_json::Error),
}
