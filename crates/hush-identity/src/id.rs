//! Session ids and the identifiers derived from them.
//!
//! A session id is a bearer credential: whoever holds it IS the session.
//! So the raw value only ever leaves this type through
//! [`SessionId::expose`], which callers use for building the store key
//! and setting the client's cookie. Logs and URLs use the derived
//! identifiers.

use std::fmt;

use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::IdentityError;

/// Random bytes per session id. Hex-encoded this yields 64 characters.
pub const SESSION_ID_BYTES: usize = 32;

/// Length of [`short_identifier`].
pub const SHORT_IDENTIFIER_LEN: usize = 12;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// An opaque session token.
///
/// `Debug` and `Display` print the short identifier, never the token, so
/// a `SessionId` can sit inside any struct that gets logged.
///
/// `SessionId::default()` is the *placeholder*: an empty token carried by
/// records that have not been created in the store yet. Every placeholder
/// equals every other placeholder.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct SessionId(String);

impl SessionId {
    /// The placeholder id. Same as `SessionId::default()`.
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// Wraps a token that arrived from a client (e.g. a cookie value).
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns `true` for the placeholder id.
    pub fn is_placeholder(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw token. Only for store keys and the client cookie.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Length of the raw token in characters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Same as [`is_placeholder`](Self::is_placeholder).
    pub fn is_empty(&self) -> bool {
        self.is_placeholder()
    }

    /// See [`identifier`].
    pub fn identifier(&self) -> String {
        identifier(&self.0)
    }

    /// See [`short_identifier`].
    pub fn short_identifier(&self) -> String {
        short_identifier(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            write!(f, "SessionId(<placeholder>)")
        } else {
            write!(f, "SessionId({})", self.short_identifier())
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            write!(f, "<placeholder>")
        } else {
            f.write_str(&self.short_identifier())
        }
    }
}

// ---------------------------------------------------------------------------
// Generation and derivation
// ---------------------------------------------------------------------------

/// Generates a fresh session id from the OS random source.
///
/// Nothing guessable (time, counters, client address) goes into it.
///
/// # Errors
/// [`IdentityError::Generation`] if the OS source cannot be read. There
/// is no fallback.
pub fn generate_id() -> Result<SessionId, IdentityError> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| IdentityError::Generation(e.to_string()))?;
    Ok(SessionId(hex::encode(bytes)))
}

/// One-way display identifier: the hex SHA-256 of the token (64 chars).
pub fn identifier(sessid: &str) -> String {
    hex::encode(Sha256::digest(sessid.as_bytes()))
}

/// The first [`SHORT_IDENTIFIER_LEN`] characters of [`identifier`].
///
/// A correlation hint for humans, not a lookup key.
pub fn short_identifier(sessid: &str) -> String {
    let mut full = identifier(sessid);
    full.truncate(SHORT_IDENTIFIER_LEN);
    full
}
