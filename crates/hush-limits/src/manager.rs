//! Action counter: counts, limits, and clears per-session actions.

use std::sync::Arc;

use hush_session::SessionRecord;
use hush_store::{KeyedStore, StoreError};

use crate::{LimitConfig, LimitError, PlanLookup, RecordPlanLookup};

/// Counts actions per session and enforces plan ceilings.
///
/// Counters live in the store under `{key_prefix}:{subject}:{action}`,
/// where the subject is the session's one-way identifier. A record that
/// was never persisted has no identifier of its own, so it is counted by
/// a hash of its client address instead. Every increment is a single
/// atomic store call, so concurrent requests never lose a count.
pub struct ActionCounter<S: KeyedStore, P: PlanLookup = RecordPlanLookup> {
    store: Arc<S>,
    lookup: Arc<P>,
    config: LimitConfig,
}

impl<S: KeyedStore, P: PlanLookup> Clone for ActionCounter<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lookup: Arc::clone(&self.lookup),
            config: self.config.clone(),
        }
    }
}

impl<S: KeyedStore, P: PlanLookup> ActionCounter<S, P> {
    pub fn new(store: impl Into<Arc<S>>, lookup: P, config: LimitConfig) -> Self {
        Self {
            store: store.into(),
            lookup: Arc::new(lookup),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    fn key(&self, record: &SessionRecord, action: &str) -> String {
        let subject = if record.is_placeholder() {
            hush_identity::identifier(&format!("ip:{}", record.ipaddress()))
        } else {
            record.identifier()
        };
        format!("{}:{}:{}", self.config.key_prefix, subject, action)
    }

    /// Current count of `action` in this window; 0 if never performed or
    /// the window has lapsed.
    pub async fn event_get(
        &self,
        record: &SessionRecord,
        action: &str,
    ) -> Result<u64, LimitError> {
        let Some(raw) = self.store.get(&self.key(record, action)).await? else {
            return Ok(0);
        };
        let count = raw.parse().map_err(|_| StoreError::Corrupt {
            field: action.to_string(),
            reason: format!("expected a counter, got {raw:?}"),
        })?;
        Ok(count)
    }

    /// Counts one more `action` and checks it against the session's plan.
    ///
    /// The count is taken before the check, so a refused attempt still
    /// counts. With a ceiling of `n`, calls `1..=n` succeed and call
    /// `n + 1` (and every later call in the window) fails.
    ///
    /// # Errors
    /// - [`LimitError::Throttled`] — ceiling exceeded
    /// - [`LimitError::Plan`] — the plan could not be resolved
    /// - [`LimitError::Store`] — the store failed
    pub async fn limit_action(
        &self,
        record: &SessionRecord,
        action: &str,
    ) -> Result<u64, LimitError> {
        let plan = self.lookup.plan_for(record).await?;
        let limits = self.config.limits_for(&plan);

        let count = self
            .store
            .incr(&self.key(record, action), self.config.window)
            .await?;

        match limits.ceiling(action) {
            Some(limit) if count > limit => {
                tracing::warn!(
                    session = %record.sessid(),
                    action,
                    plan = %plan,
                    count,
                    limit,
                    "action throttled"
                );
                Err(LimitError::Throttled {
                    action: action.to_string(),
                    count,
                    limit,
                })
            }
            _ => {
                tracing::debug!(session = %record.sessid(), action, count, "action counted");
                Ok(count)
            }
        }
    }

    /// Resets the counter for `action` to zero.
    pub async fn event_clear(
        &self,
        record: &SessionRecord,
        action: &str,
    ) -> Result<(), LimitError> {
        self.store.delete(&self.key(record, action)).await?;
        tracing::debug!(session = %record.sessid(), action, "action counter cleared");
        Ok(())
    }
}
