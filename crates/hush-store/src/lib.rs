//! Keyed store abstraction for Hush sessions.
//!
//! Provides the [`KeyedStore`] trait the session layer talks to, plus two
//! implementations:
//!
//! - [`MemoryStore`] — in-process, TTL-aware. Used by tests and demos.
//! - [`RedisStore`] — one Redis hash per session, reached over the network.
//!
//! # Feature Flags
//!
//! - `redis` (default) — Redis store via the `redis` crate

mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use error::StoreError;
pub use memory::{MemoryStore, SWEEP_EVERY};
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisStore};

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Field name → value pairs stored under a single key.
pub type Fields = HashMap<String, String>;

/// A persistent keyed store with per-field granularity and TTL support.
///
/// Every operation is a single round trip. A key that has expired is
/// indistinguishable from one that never existed: reads return `None`
/// (or `false`), never an error. Errors are reserved for the store itself
/// misbehaving (unreachable, timed out, or holding a value of the wrong
/// shape).
///
/// Futures are `Send` so a store can be driven from any Tokio worker.
pub trait KeyedStore: Send + Sync + 'static {
    /// Reads every field stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or expired.
    fn fetch_fields(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Fields>, StoreError>> + Send;

    /// Replaces whatever is stored under `key` with `fields` and arms a
    /// fresh TTL, as one atomic step.
    fn put_fields(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Writes `fields` into an existing key, leaving its TTL alone.
    ///
    /// Returns `Ok(false)` and writes nothing if the key is absent, so an
    /// expired record is never brought back without an expiry.
    fn patch_fields(
        &self,
        key: &str,
        fields: &Fields,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes one field from `key` and returns its value, as a single
    /// atomic step. Two concurrent takes never both see the same value,
    /// and a write landing after the take is never removed by it.
    ///
    /// Returns `Ok(None)` if the key or the field is absent.
    fn take_field(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Deletes `key`. Returns `true` if it existed.
    fn delete(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Presence check. Never extends the TTL.
    fn exists(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Re-arms the TTL on `key`. Returns `false` if the key is absent.
    fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Reads a plain value (counters).
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Atomically increments the counter at `key` and returns the new
    /// value. The first increment (counter absent) sets `window` as the
    /// counter's expiry; later increments keep it.
    fn incr(
        &self,
        key: &str,
        window: Duration,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
