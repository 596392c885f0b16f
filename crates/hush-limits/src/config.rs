//! Limit configuration: the counting window and per-plan ceilings.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Plan assigned to sessions that belong to nobody.
pub const ANONYMOUS_PLAN: &str = "anonymous";

// ---------------------------------------------------------------------------
// PlanLimits
// ---------------------------------------------------------------------------

/// Action ceilings for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Ceiling for any action without its own entry in `ceilings`.
    pub default_ceiling: u64,

    /// Per-action overrides.
    pub ceilings: HashMap<String, u64>,

    /// Paid plans skip the ceiling check entirely. Actions are still
    /// counted.
    pub unlimited: bool,
}

impl PlanLimits {
    /// A plan with one ceiling for every action.
    pub fn with_ceiling(ceiling: u64) -> Self {
        Self {
            default_ceiling: ceiling,
            ceilings: HashMap::new(),
            unlimited: false,
        }
    }

    /// A plan that is never throttled.
    pub fn unlimited() -> Self {
        Self {
            default_ceiling: u64::MAX,
            ceilings: HashMap::new(),
            unlimited: true,
        }
    }

    /// Adds a per-action override.
    pub fn action(mut self, action: impl Into<String>, ceiling: u64) -> Self {
        self.ceilings.insert(action.into(), ceiling);
        self
    }

    /// The ceiling for `action`, or `None` if this plan is unlimited.
    pub fn ceiling(&self, action: &str) -> Option<u64> {
        if self.unlimited {
            return None;
        }
        Some(
            self.ceilings
                .get(action)
                .copied()
                .unwrap_or(self.default_ceiling),
        )
    }
}

// ---------------------------------------------------------------------------
// LimitConfig
// ---------------------------------------------------------------------------

/// Configuration for [`ActionCounter`](crate::ActionCounter).
///
/// Passed in explicitly; nothing is read from process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// How long a counter lives after its first increment.
    ///
    /// Default: 20 minutes, the same horizon as a session.
    pub window: Duration,

    /// Counter keys look like `{key_prefix}:{identifier}:{action}`.
    pub key_prefix: String,

    /// Ceilings by plan id.
    pub plans: HashMap<String, PlanLimits>,

    /// Plan used when a session's plan is unknown or unset.
    pub default_plan: String,
}

impl LimitConfig {
    /// Adds or replaces a plan.
    pub fn plan(mut self, planid: impl Into<String>, limits: PlanLimits) -> Self {
        self.plans.insert(planid.into(), limits);
        self
    }

    /// Limits for `planid`, falling back to the default plan. If even the
    /// default plan is missing, the strictest possible limits apply.
    pub fn limits_for(&self, planid: &str) -> PlanLimits {
        self.plans
            .get(planid)
            .or_else(|| self.plans.get(&self.default_plan))
            .cloned()
            .unwrap_or_else(|| PlanLimits::with_ceiling(0))
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        let plans = HashMap::from([
            (ANONYMOUS_PLAN.to_string(), PlanLimits::with_ceiling(10)),
            ("basic".to_string(), PlanLimits::with_ceiling(50)),
            ("identity".to_string(), PlanLimits::unlimited()),
        ]);
        Self {
            window: Duration::from_secs(20 * 60),
            key_prefix: "limiter".to_string(),
            plans,
            default_plan: ANONYMOUS_PLAN.to_string(),
        }
    }
}
