//! Plan resolution: which plan's ceilings apply to a session.
//!
//! Plans belong to customers, and customers live outside this crate. The
//! [`PlanLookup`] trait is the seam: the counter asks it for a plan id and
//! looks the ceilings up in [`LimitConfig`](crate::LimitConfig).

use std::future::Future;

use hush_session::SessionRecord;

use crate::LimitError;
use crate::config::ANONYMOUS_PLAN;

/// Resolves the plan id that governs a session's limits.
///
/// # Example
///
/// ```rust
/// use hush_limits::{LimitError, PlanLookup};
/// use hush_session::SessionRecord;
///
/// /// Everyone is on the same plan.
/// struct FlatPlan;
///
/// impl PlanLookup for FlatPlan {
///     async fn plan_for(&self, _record: &SessionRecord) -> Result<String, LimitError> {
///         Ok("basic".to_string())
///     }
/// }
/// ```
pub trait PlanLookup: Send + Sync + 'static {
    /// Returns the plan id for `record`.
    ///
    /// An id with no configured limits is not an error; the counter falls
    /// back to the default plan.
    ///
    /// # Errors
    /// [`LimitError::Plan`] if the lookup itself failed (e.g. the customer
    /// service is down).
    fn plan_for(
        &self,
        record: &SessionRecord,
    ) -> impl Future<Output = Result<String, LimitError>> + Send;
}

/// Reads the plan straight off the session record.
///
/// Anonymous sessions are always on the anonymous plan, whatever their
/// `planid` says. Others use `planid`, or `default_plan` when unset.
#[derive(Debug, Clone)]
pub struct RecordPlanLookup {
    default_plan: String,
}

impl RecordPlanLookup {
    pub fn new(default_plan: impl Into<String>) -> Self {
        Self {
            default_plan: default_plan.into(),
        }
    }
}

impl Default for RecordPlanLookup {
    fn default() -> Self {
        Self::new(ANONYMOUS_PLAN)
    }
}

impl PlanLookup for RecordPlanLookup {
    async fn plan_for(&self, record: &SessionRecord) -> Result<String, LimitError> {
        if record.anonymous() {
            return Ok(ANONYMOUS_PLAN.to_string());
        }
        Ok(record
            .planid()
            .map(str::to_string)
            .unwrap_or_else(|| self.default_plan.clone()))
    }
}
