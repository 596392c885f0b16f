//! # Hush
//!
//! Store-backed web sessions: opaque ids, one-way display identifiers,
//! write-through field updates, id rotation against session fixation, and
//! per-plan action limits.
//!
//! ## Quick Start
//!
//! ```rust
//! use hush::prelude::*;
//!
//! # async fn demo() -> Result<(), HushError> {
//! let core: SessionCore<MemoryStore> = SessionCoreBuilder::new().build(MemoryStore::new());
//!
//! let mut sess = core.sessions.create("10.0.0.254", "tryouts", "Mozilla/5.0").await?;
//! core.sessions.set_authenticated(&mut sess, true).await?;
//! core.sessions.replace(&mut sess).await?;
//!
//! core.limits.limit_action(&sess, "create_secret").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`hush_store`]: the [`KeyedStore`](prelude::KeyedStore) trait, Redis and in-memory stores
//! - [`hush_identity`]: session ids and derived identifiers
//! - [`hush_session`]: session records and the session service
//! - [`hush_limits`]: action counters and plan ceilings

mod builder;
mod error;
pub mod telemetry;

pub use builder::{SessionCore, SessionCoreBuilder};
pub use error::HushError;

pub use hush_identity;
pub use hush_limits;
pub use hush_session;
pub use hush_store;

pub mod prelude {
    //! Everything a request handler usually needs.

    pub use crate::{HushError, SessionCore, SessionCoreBuilder};
    pub use hush_identity::{FormFields, SessionId};
    pub use hush_limits::{
        ActionCounter, LimitConfig, LimitError, PlanLimits, PlanLookup, RecordPlanLookup,
    };
    pub use hush_session::{
        SessionConfig, SessionError, SessionField, SessionRecord, SessionService,
    };
    pub use hush_store::{KeyedStore, MemoryStore, StoreError};
    #[cfg(feature = "redis")]
    pub use hush_store::{RedisConfig, RedisStore};
}
