//! Per-session action limiting for Hush.
//!
//! Counts how often a session performs an action inside a time window and
//! refuses the action once the session's plan ceiling is passed.
//!
//! # Key types
//!
//! - [`ActionCounter`] — `event_get`, `limit_action`, `event_clear`
//! - [`PlanLookup`] — resolves which plan a session is on
//! - [`RecordPlanLookup`] — resolves it from the session record itself
//! - [`LimitConfig`] / [`PlanLimits`] — window, key prefix, per-plan ceilings

mod config;
mod error;
mod logic;
mod manager;

pub use config::{ANONYMOUS_PLAN, LimitConfig, PlanLimits};
pub use error::LimitError;
pub use logic::{PlanLookup, RecordPlanLookup};
pub use manager::ActionCounter;
