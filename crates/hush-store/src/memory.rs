//! In-process store with TTL support.
//!
//! Deadlines are measured on the Tokio clock, so tests can use
//! `tokio::time::pause()` / `advance()` to expire keys without sleeping.
//! Expired entries are invisible to every operation. They are evicted
//! when their key is next written, and by a full sweep every
//! [`SWEEP_EVERY`] writes, so keys nobody touches again do not pile up.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Fields, KeyedStore, StoreError};

/// Writes between full sweeps of expired entries.
pub const SWEEP_EVERY: u64 = 128;

#[derive(Debug, Clone)]
enum Value {
    Hash(Fields),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// A [`KeyedStore`] held entirely in memory.
///
/// Cloning is cheap and every clone shares the same entries, the same
/// way several processes would share one Redis.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    writes: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Returns `true` if no live keys remain.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every expired entry now. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        sweep(&mut entries, now)
    }

    /// Counts one write and sweeps on every [`SWEEP_EVERY`]th.
    fn note_write(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY == 0 {
            let dropped = sweep(entries, now);
            if dropped > 0 {
                tracing::trace!(dropped, remaining = entries.len(), "swept expired entries");
            }
        }
    }
}

fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, e| e.is_live(now));
    before - entries.len()
}

/// Drops `key` if it has expired, so callers can treat whatever is left
/// as live.
fn evict_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Backend(format!(
        "WRONGTYPE operation against key `{key}` holding the wrong kind of value"
    ))
}

impl KeyedStore for MemoryStore {
    async fn fetch_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            Some(Entry { value: Value::Hash(fields), .. }) => Ok(Some(fields.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn put_fields(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.note_write(&mut entries, now);
        if fields.is_empty() {
            entries.remove(key);
            return Ok(());
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Hash(fields.clone()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn patch_fields(&self, key: &str, fields: &Fields) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.note_write(&mut entries, now);
        evict_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(Entry { value: Value::Hash(stored), .. }) => {
                stored.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(true)
            }
            Some(_) => Err(wrong_type(key)),
            None => Ok(false),
        }
    }

    async fn take_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.note_write(&mut entries, now);
        evict_expired(&mut entries, key, now);
        let (taken, now_empty) = match entries.get_mut(key) {
            Some(Entry { value: Value::Hash(stored), .. }) => {
                let taken = stored.remove(field);
                (taken, stored.is_empty())
            }
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(None),
        };
        // Redis drops a hash once its last field is gone.
        if now_empty {
            entries.remove(key);
        }
        Ok(taken)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.note_write(&mut entries, now);
        evict_expired(&mut entries, key, now);
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.note_write(&mut entries, now);
        evict_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            Some(Entry { value: Value::Counter(n), .. }) => Ok(Some(n.to_string())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.note_write(&mut entries, now);
        evict_expired(&mut entries, key, now);
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at: Some(now + window),
        });
        match &mut entry.value {
            Value::Counter(n) => {
                *n += 1;
                Ok(*n)
            }
            Value::Hash(_) => Err(wrong_type(key)),
        }
    }
}
