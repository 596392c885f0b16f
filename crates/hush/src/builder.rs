//! `SessionCore` and its builder.
//!
//! Ties the layers together over one shared store: sessions and action
//! counters read and write the same keyspace under different prefixes.

use std::sync::Arc;

use hush_limits::{ActionCounter, LimitConfig, PlanLookup, RecordPlanLookup};
use hush_session::{SessionConfig, SessionService};
use hush_store::KeyedStore;
#[cfg(feature = "redis")]
use hush_store::{RedisConfig, RedisStore};

#[cfg(feature = "redis")]
use crate::HushError;

/// Builder for a [`SessionCore`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use hush::prelude::*;
///
/// let core: SessionCore<MemoryStore> = SessionCoreBuilder::new()
///     .session_config(SessionConfig {
///         ttl: Duration::from_secs(600),
///         ..SessionConfig::default()
///     })
///     .build(MemoryStore::new());
/// assert_eq!(core.sessions.config().ttl, Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionCoreBuilder {
    session_config: SessionConfig,
    limit_config: LimitConfig,
}

impl SessionCoreBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the action-limit configuration.
    pub fn limit_config(mut self, config: LimitConfig) -> Self {
        self.limit_config = config;
        self
    }

    /// Builds over `store`, resolving plans from the session record.
    pub fn build<S: KeyedStore>(self, store: impl Into<Arc<S>>) -> SessionCore<S> {
        let lookup = RecordPlanLookup::new(self.limit_config.default_plan.clone());
        self.build_with_lookup(store, lookup)
    }

    /// Builds over `store` with a custom plan lookup.
    ///
    /// A counting window longer than the session TTL is clamped to the
    /// TTL: counters must not outlive the sessions they count.
    pub fn build_with_lookup<S: KeyedStore, P: PlanLookup>(
        mut self,
        store: impl Into<Arc<S>>,
        lookup: P,
    ) -> SessionCore<S, P> {
        let ttl = self.session_config.ttl;
        if self.limit_config.window > ttl {
            tracing::warn!(
                window = ?self.limit_config.window,
                ttl = ?ttl,
                "limit window exceeds session ttl; clamping to ttl"
            );
            self.limit_config.window = ttl;
        }

        let store = store.into();
        SessionCore {
            sessions: SessionService::new(Arc::clone(&store), self.session_config),
            limits: ActionCounter::new(store, lookup, self.limit_config),
        }
    }

    /// Connects to Redis and builds over it.
    ///
    /// # Errors
    /// [`HushError::Store`] if the server cannot be reached within
    /// [`RedisConfig::connect_timeout`].
    #[cfg(feature = "redis")]
    pub async fn connect_redis(
        self,
        config: &RedisConfig,
    ) -> Result<SessionCore<RedisStore>, HushError> {
        let store = RedisStore::connect(config).await?;
        tracing::info!("session core connected to redis");
        Ok(self.build(store))
    }
}

/// Sessions and action counters over one store.
pub struct SessionCore<S: KeyedStore, P: PlanLookup = RecordPlanLookup> {
    pub sessions: SessionService<S>,
    pub limits: ActionCounter<S, P>,
}

impl<S: KeyedStore, P: PlanLookup> Clone for SessionCore<S, P> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            limits: self.limits.clone(),
        }
    }
}

impl<S: KeyedStore, P: PlanLookup> SessionCore<S, P> {
    /// The store both halves share.
    pub fn store(&self) -> &Arc<S> {
        self.sessions.store()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hush_limits::{LimitError, PlanLimits};
    use hush_session::SessionRecord;
    use hush_store::MemoryStore;

    use super::*;

    struct EveryoneBasic;

    impl PlanLookup for EveryoneBasic {
        async fn plan_for(&self, _record: &SessionRecord) -> Result<String, LimitError> {
            Ok("basic".to_string())
        }
    }

    #[test]
    fn test_build_shares_one_store() {
        let core: SessionCore<MemoryStore> = SessionCoreBuilder::new().build(MemoryStore::new());

        assert!(Arc::ptr_eq(core.sessions.store(), core.limits.store()));
    }

    #[tokio::test]
    async fn test_build_with_lookup_uses_custom_plans() {
        let core: SessionCore<MemoryStore, EveryoneBasic> = SessionCoreBuilder::new()
            .limit_config(LimitConfig::default().plan("basic", PlanLimits::with_ceiling(1)))
            .build_with_lookup(MemoryStore::new(), EveryoneBasic);
        let record = SessionRecord::with_client("10.0.0.254", "anon");

        core.limits.limit_action(&record, "create_secret").await.unwrap();
        let err = core.limits.limit_action(&record, "create_secret").await.unwrap_err();

        assert!(matches!(err, LimitError::Throttled { limit: 1, .. }));
    }

    #[test]
    fn test_build_window_longer_than_ttl_clamped() {
        let ttl = Duration::from_secs(600);
        let core: SessionCore<MemoryStore> = SessionCoreBuilder::new()
            .session_config(SessionConfig {
                ttl,
                ..SessionConfig::default()
            })
            .limit_config(LimitConfig {
                window: Duration::from_secs(3600),
                ..LimitConfig::default()
            })
            .build(MemoryStore::new());

        assert_eq!(core.limits.config().window, ttl);
    }

    #[test]
    fn test_build_window_within_ttl_kept() {
        let window = Duration::from_secs(60);
        let core: SessionCore<MemoryStore> = SessionCoreBuilder::new()
            .limit_config(LimitConfig {
                window,
                ..LimitConfig::default()
            })
            .build(MemoryStore::new());

        assert_eq!(core.limits.config().window, window);
    }
}
