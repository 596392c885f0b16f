//! Redis store implementation using `redis` with a connection manager.
//!
//! Each session is one Redis hash. Multi-step writes go through a
//! MULTI/EXEC pipeline or a Lua script so that no other client observes a
//! half-written record.

use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult, Script};

use crate::{Fields, KeyedStore, StoreError};

/// Writes fields only when the hash already exists.
const PATCH_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return 0
    end
    redis.call('HSET', KEYS[1], unpack(ARGV))
    return 1
"#;

/// HGET + HDEL in one step, so a value is handed to exactly one caller.
const TAKE_SCRIPT: &str = r#"
    local value = redis.call('HGET', KEYS[1], ARGV[1])
    if value then
        redis.call('HDEL', KEYS[1], ARGV[1])
    end
    return value
"#;

/// INCR + EXPIRE-on-first, so a counter can never be left without an expiry.
const INCREMENT_SCRIPT: &str = r#"
    local count = redis.call('INCR', KEYS[1])
    if count == 1 then
        redis.call('EXPIRE', KEYS[1], ARGV[1])
    end
    return count
"#;

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,

    /// Upper bound for a single store operation.
    pub op_timeout: Duration,

    /// Upper bound for establishing the initial connection.
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            op_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// A [`KeyedStore`] backed by Redis.
///
/// Cloning shares the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
    patch: Script,
    take: Script,
    increment: Script,
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Errors
    /// [`StoreError::Timeout`] if the connection is not up within
    /// `connect_timeout`; [`StoreError::Unavailable`] if it is refused.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())?;
        let manager =
            tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
                .await
                .map_err(|_| StoreError::Timeout(config.connect_timeout))??;

        tracing::info!(op_timeout = ?config.op_timeout, "redis store connected");

        Ok(Self {
            manager,
            op_timeout: config.op_timeout,
            patch: Script::new(PATCH_SCRIPT),
            take: Script::new(TAKE_SCRIPT),
            increment: Script::new(INCREMENT_SCRIPT),
        })
    }

    /// Runs one Redis call under the operation timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

/// Redis EXPIRE takes whole, positive seconds.
fn expire_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

impl KeyedStore for RedisStore {
    async fn fetch_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        let mut conn = self.manager.clone();
        let fields: Fields = self.bounded(conn.hgetall(key)).await?;
        // HGETALL answers an empty map for a missing key.
        Ok((!fields.is_empty()).then_some(fields))
    }

    async fn put_fields(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !items.is_empty() {
            pipe.hset_multiple(key, items.as_slice())
                .ignore()
                .expire(key, expire_secs(ttl))
                .ignore();
        }
        self.bounded(pipe.query_async::<()>(&mut conn)).await
    }

    async fn patch_fields(&self, key: &str, fields: &Fields) -> Result<bool, StoreError> {
        if fields.is_empty() {
            return self.exists(key).await;
        }
        let mut conn = self.manager.clone();
        let mut invocation = self.patch.key(key);
        for (field, value) in fields {
            invocation.arg(field.as_str()).arg(value.as_str());
        }
        let written: i64 = self.bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(written == 1)
    }

    async fn take_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        let mut invocation = self.take.key(key);
        invocation.arg(field);
        self.bounded(invocation.invoke_async(&mut conn)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let removed: i64 = self.bounded(conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        self.bounded(conn.exists(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        self.bounded(conn.expire(key, expire_secs(ttl))).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        self.bounded(conn.get(key)).await
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let mut conn = self.manager.clone();
        let mut invocation = self.increment.key(key);
        invocation.arg(expire_secs(window));
        let count: i64 = self.bounded(invocation.invoke_async(&mut conn)).await?;
        u64::try_from(count).map_err(|_| StoreError::Corrupt {
            field: key.to_string(),
            reason: format!("counter went negative ({count})"),
        })
    }
}
